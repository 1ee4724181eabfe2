/// A read-only question routed to exactly one query handler.
///
/// Queries are side-effect-free from the caller's perspective and carry
/// their result type so the bus can hand back a typed answer.
pub trait Query: core::fmt::Debug + Send + Sync + 'static {
    type Output: Send + 'static;
}
