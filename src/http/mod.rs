//! The petrel HTTP implementation.

pub mod headers;
pub mod method;
pub mod mime;
pub mod qvalue;
pub mod request;
pub mod request_body;
pub mod request_head;
pub mod response;
pub mod response_writer;
pub mod status;

pub use request::Request;
pub use response::Response;
pub use status::StatusCode;
