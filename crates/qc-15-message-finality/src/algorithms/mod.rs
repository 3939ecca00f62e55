//! # Algorithms Module
//!
//! Submission check and finality polling.

pub mod backoff;
pub mod finality;
pub mod submit;

pub use backoff::finality_wait;
pub use finality::{get_finalized_msg_result, get_finalized_msg_result_with_config};
pub use submit::send_msgs_and_check_result;
