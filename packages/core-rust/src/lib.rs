//! Crate dispatch core: wire messages and the length-prefixed JSON codec.

pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{CallerCodec, JsonCodec, WorkerCodec, DEFAULT_MAX_FRAME_LENGTH};
pub use error::ProtocolError;
pub use messages::{
    Args, DispatchRequest, DispatchResponse, Kwargs, MALFORMED_REQUEST, UNREGISTERED_TASK,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
