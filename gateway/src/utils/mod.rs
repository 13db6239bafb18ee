pub mod call_id;
pub use call_id::{CallIdError, validate_call_id};
