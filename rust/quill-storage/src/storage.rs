mod backend;
pub use backend::*;

mod measure;
pub use measure::*;

mod scan;
pub use scan::*;
