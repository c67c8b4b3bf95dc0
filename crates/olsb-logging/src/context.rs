//! Node context injection for multi-node logging
//!
//! A simulation runs many routing engines on one thread. This module keeps
//! the address of the node currently being driven in thread-local storage
//! so every log entry in that scope can be attributed to it.

use std::cell::RefCell;
use std::net::Ipv4Addr;

use olsb_core::InterfaceAddress;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// Primary address of the node
    pub address: Ipv4Addr,
    /// Unique instance ID for this node's run
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread;
/// dropping it restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use olsb_logging::context::NodeContextGuard;
///
/// let _guard = NodeContextGuard::new("10.1.1.1".parse().unwrap());
///
/// // Spans created in this scope carry node = 10.1.1.1
/// tracing::info!("Periodic update");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Set the node context for the current scope
    pub fn new(address: Ipv4Addr) -> Self {
        Self::with_instance_id(address, Uuid::new_v4())
    }

    /// Set the node context from an interface address
    pub fn for_interface(interface: &InterfaceAddress) -> Self {
        Self::new(interface.local)
    }

    /// Set the node context with a specific instance ID
    ///
    /// Useful to keep one instance ID across the many scopes a simulated
    /// node is entered in.
    pub fn with_instance_id(address: Ipv4Addr, instance_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow().clone());
        NODE_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = Some(NodeContextData {
                address,
                instance_id,
            })
        });
        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node address (if set)
    pub fn current_address() -> Option<Ipv4Addr> {
        Self::current().map(|ctx| ctx.address)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Span tagging everything inside it with a node address
pub fn node_span(address: Ipv4Addr) -> tracing::Span {
    tracing::info_span!("node", node = %address)
}

/// Run a block with the node context set
///
/// # Example
///
/// ```ignore
/// with_node_context!(address, {
///     engine.handle_timer(token);
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($address:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($address);
        $body
    }};
}
