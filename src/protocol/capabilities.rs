//! Capability gating.
//!
//! Each peer declares its capabilities at initialize time; afterwards every
//! outbound request and notification is checked against what the relevant
//! peer declared. Violations surface as [`Error::Capability`] before any
//! bytes leave the process.

use crate::errors::Error;
use crate::protocol::methods;
use crate::types::{ ClientCapabilities, ServerCapabilities };

/// Role-specific capability policy installed into the engine after the
/// handshake.
pub trait CapabilityGate: Send + Sync {
    /// Check an outbound request method.
    fn check_request(&self, method: &str) -> Result<(), Error>;

    /// Check an outbound notification method.
    fn check_notification(&self, method: &str) -> Result<(), Error>;
}

/// The client side's policy: requests are gated on what the server
/// declared, notifications on the client's own declaration.
pub struct ClientCapabilityGate {
    pub server: ServerCapabilities,
    pub client: ClientCapabilities,
}

impl CapabilityGate for ClientCapabilityGate {
    fn check_request(&self, method: &str) -> Result<(), Error> {
        assert_client_request(&self.server, method)
    }

    fn check_notification(&self, method: &str) -> Result<(), Error> {
        assert_client_notification(&self.client, method)
    }
}

/// The server side's policy: requests are gated on what the client
/// declared, notifications on the server's own declaration.
pub struct ServerCapabilityGate {
    pub client: ClientCapabilities,
    pub server: ServerCapabilities,
}

impl CapabilityGate for ServerCapabilityGate {
    fn check_request(&self, method: &str) -> Result<(), Error> {
        assert_server_request(&self.client, method)
    }

    fn check_notification(&self, method: &str) -> Result<(), Error> {
        assert_server_notification(&self.server, method)
    }
}

fn missing(method: &str, capability: &str) -> Error {
    Error::Capability(format!("{} requires the {} capability", method, capability))
}

/// Gate a client→server request on the server's declared capabilities.
pub fn assert_client_request(server: &ServerCapabilities, method: &str) -> Result<(), Error> {
    match method {
        methods::PROMPTS_LIST | methods::PROMPTS_GET | methods::COMPLETION_COMPLETE => {
            if server.prompts.is_none() {
                return Err(missing(method, "server.prompts"));
            }
        }
        | methods::RESOURCES_LIST
        | methods::RESOURCES_TEMPLATES_LIST
        | methods::RESOURCES_READ => {
            if server.resources.is_none() {
                return Err(missing(method, "server.resources"));
            }
        }
        methods::RESOURCES_SUBSCRIBE | methods::RESOURCES_UNSUBSCRIBE => {
            let subscribe = server.resources
                .as_ref()
                .and_then(|resources| resources.subscribe)
                .unwrap_or(false);
            if !subscribe {
                return Err(missing(method, "server.resources.subscribe"));
            }
        }
        methods::TOOLS_LIST | methods::TOOLS_CALL => {
            if server.tools.is_none() {
                return Err(missing(method, "server.tools"));
            }
        }
        methods::LOGGING_SET_LEVEL => {
            if server.logging.is_none() {
                return Err(missing(method, "server.logging"));
            }
        }
        // ping, initialize and unknown extensions are never gated here.
        _ => {}
    }
    Ok(())
}

/// Gate a client→server notification on the client's own declaration.
pub fn assert_client_notification(client: &ClientCapabilities, method: &str) -> Result<(), Error> {
    if method == methods::NOTIFICATION_ROOTS_LIST_CHANGED {
        let list_changed = client.roots
            .as_ref()
            .and_then(|roots| roots.list_changed)
            .unwrap_or(false);
        if !list_changed {
            return Err(missing(method, "client.roots.listChanged"));
        }
    }
    Ok(())
}

/// Gate a server→client request on the client's declared capabilities.
pub fn assert_server_request(client: &ClientCapabilities, method: &str) -> Result<(), Error> {
    match method {
        methods::SAMPLING_CREATE_MESSAGE => {
            if client.sampling.is_none() {
                return Err(missing(method, "client.sampling"));
            }
        }
        methods::ROOTS_LIST => {
            if client.roots.is_none() {
                return Err(missing(method, "client.roots"));
            }
        }
        methods::ELICITATION_CREATE => {
            if client.elicitation.is_none() {
                return Err(missing(method, "client.elicitation"));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Gate a server→client notification on the server's own declaration.
pub fn assert_server_notification(server: &ServerCapabilities, method: &str) -> Result<(), Error> {
    match method {
        methods::NOTIFICATION_TOOLS_LIST_CHANGED => {
            if server.tools.is_none() {
                return Err(missing(method, "server.tools"));
            }
        }
        methods::NOTIFICATION_PROMPTS_LIST_CHANGED => {
            if server.prompts.is_none() {
                return Err(missing(method, "server.prompts"));
            }
        }
        methods::NOTIFICATION_RESOURCES_LIST_CHANGED | methods::NOTIFICATION_RESOURCES_UPDATED => {
            if server.resources.is_none() {
                return Err(missing(method, "server.resources"));
            }
        }
        methods::NOTIFICATION_MESSAGE => {
            if server.logging.is_none() {
                return Err(missing(method, "server.logging"));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ ResourcesCapability, RootsCapability, ToolsCapability };
    use std::collections::HashMap;

    #[test]
    fn tools_methods_require_tools_capability() {
        let none = ServerCapabilities::default();
        assert!(assert_client_request(&none, methods::TOOLS_LIST).is_err());
        assert!(assert_client_request(&none, methods::TOOLS_CALL).is_err());

        let with_tools = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        };
        assert!(assert_client_request(&with_tools, methods::TOOLS_LIST).is_ok());
    }

    #[test]
    fn subscribe_requires_the_subscribe_flag() {
        let read_only = ServerCapabilities {
            resources: Some(ResourcesCapability { subscribe: None, list_changed: None }),
            ..Default::default()
        };
        assert!(assert_client_request(&read_only, methods::RESOURCES_READ).is_ok());
        assert!(assert_client_request(&read_only, methods::RESOURCES_SUBSCRIBE).is_err());

        let subscribable = ServerCapabilities {
            resources: Some(ResourcesCapability { subscribe: Some(true), list_changed: None }),
            ..Default::default()
        };
        assert!(assert_client_request(&subscribable, methods::RESOURCES_SUBSCRIBE).is_ok());
    }

    #[test]
    fn ping_is_never_gated() {
        let none = ServerCapabilities::default();
        assert!(assert_client_request(&none, methods::PING).is_ok());
        assert!(assert_server_request(&ClientCapabilities::default(), methods::PING).is_ok());
    }

    #[test]
    fn sampling_and_elicitation_gate_on_client_capabilities() {
        let bare = ClientCapabilities::default();
        assert!(assert_server_request(&bare, methods::SAMPLING_CREATE_MESSAGE).is_err());
        assert!(assert_server_request(&bare, methods::ELICITATION_CREATE).is_err());
        assert!(assert_server_request(&bare, methods::ROOTS_LIST).is_err());

        let full = ClientCapabilities {
            sampling: Some(HashMap::new()),
            elicitation: Some(HashMap::new()),
            roots: Some(RootsCapability { list_changed: Some(true) }),
            experimental: None,
        };
        assert!(assert_server_request(&full, methods::SAMPLING_CREATE_MESSAGE).is_ok());
        assert!(assert_server_request(&full, methods::ELICITATION_CREATE).is_ok());
        assert!(assert_server_request(&full, methods::ROOTS_LIST).is_ok());
    }

    #[test]
    fn roots_list_changed_requires_the_flag() {
        let silent = ClientCapabilities {
            roots: Some(RootsCapability { list_changed: None }),
            ..Default::default()
        };
        assert!(
            assert_client_notification(&silent, methods::NOTIFICATION_ROOTS_LIST_CHANGED).is_err()
        );

        let chatty = ClientCapabilities {
            roots: Some(RootsCapability { list_changed: Some(true) }),
            ..Default::default()
        };
        assert!(
            assert_client_notification(&chatty, methods::NOTIFICATION_ROOTS_LIST_CHANGED).is_ok()
        );
    }

    #[test]
    fn list_changed_notifications_gate_on_server_capabilities() {
        let none = ServerCapabilities::default();
        assert!(
            assert_server_notification(&none, methods::NOTIFICATION_TOOLS_LIST_CHANGED).is_err()
        );
        assert!(
            assert_server_notification(&none, methods::NOTIFICATION_RESOURCES_UPDATED).is_err()
        );
        assert!(assert_server_notification(&none, methods::NOTIFICATION_CANCELLED).is_ok());
    }
}
