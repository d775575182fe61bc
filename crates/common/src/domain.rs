mod alert;
mod device;
mod metric;
mod notification;
mod reading;
mod result;
mod series;

pub use alert::*;
pub use device::*;
pub use metric::*;
pub use notification::*;
pub use reading::*;
pub use result::*;
pub use series::*;
