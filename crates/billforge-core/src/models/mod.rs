pub mod audit;
pub mod payment_method;
pub mod plan;
pub mod promo;
pub mod subscription;
pub mod transaction;
pub mod user;

pub use audit::*;
pub use payment_method::*;
pub use plan::*;
pub use promo::*;
pub use subscription::*;
pub use transaction::*;
pub use user::*;
