//! Registration seam for domain services hosted by the supervisor.

use tonic::service::RoutesBuilder;

/// A gRPC service the supervisor serves next to health and reflection.
///
/// Implementations add their generated server to `routes`, applying
/// `max_message_size` to both decoding and encoding limits.
pub trait HostedService: Send + Sync {
    /// Fully-qualified service name, for logging.
    fn name(&self) -> &str;

    fn register(&self, routes: &mut RoutesBuilder, max_message_size: usize);

    /// Encoded `FileDescriptorSet` published through reflection.
    fn file_descriptor_set(&self) -> Option<&'static [u8]> {
        None
    }
}
