//! Wire format types for the two client dialects
//!
//! Each module contains pure serde structs matching the respective API's
//! JSON format. These types are only used for serialization/deserialization
//! at the boundary and are not used internally.

pub mod anthropic;
pub mod openai;
