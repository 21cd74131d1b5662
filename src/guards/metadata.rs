//! Side mapping from handler identity to declared protection metadata.

use http::Method;
use std::collections::HashMap;

use crate::oauth::types::RoleRequirement;

/// Identity of a route handler: the controller it belongs to and its own name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    pub controller: &'static str,
    pub handler: &'static str,
}

impl HandlerRef {
    pub const fn new(controller: &'static str, handler: &'static str) -> Self {
        Self {
            controller,
            handler,
        }
    }
}

/// Protection declared on a controller or a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub resource: Option<String>,
    pub scopes: Vec<String>,
    pub roles: Vec<RoleRequirement>,
    pub public: bool,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|scope| scope.to_string()).collect();
        self
    }

    pub fn roles(mut self, roles: Vec<RoleRequirement>) -> Self {
        self.roles = roles;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }
}

/// Registry queried by the guards at evaluation time
#[derive(Debug, Clone, Default)]
pub struct RouteMetadata {
    controllers: HashMap<&'static str, Metadata>,
    handlers: HashMap<HandlerRef, Metadata>,
    routes: HashMap<(Method, String), HandlerRef>,
}

impl RouteMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(mut self, controller: &'static str, metadata: Metadata) -> Self {
        self.controllers.insert(controller, metadata);
        self
    }

    pub fn with_handler(mut self, handler: HandlerRef, metadata: Metadata) -> Self {
        self.handlers.insert(handler, metadata);
        self
    }

    /// Bind an HTTP route (method plus matched path template) to a handler
    pub fn with_route(mut self, method: Method, path: &str, handler: HandlerRef) -> Self {
        self.routes.insert((method, path.to_string()), handler);
        self
    }

    pub fn handler_for(&self, method: &Method, path: &str) -> Option<HandlerRef> {
        self.routes.get(&(method.clone(), path.to_string())).copied()
    }

    fn controller(&self, handler: &HandlerRef) -> Option<&Metadata> {
        self.controllers.get(handler.controller)
    }

    fn handler(&self, handler: &HandlerRef) -> Option<&Metadata> {
        self.handlers.get(handler)
    }

    /// Resource declared on the handler's controller; handler-level resources are ignored
    pub fn resource(&self, handler: &HandlerRef) -> Option<&str> {
        self.controller(handler)
            .and_then(|metadata| metadata.resource.as_deref())
    }

    /// Handler scopes followed by controller scopes, without duplicates
    pub fn scopes(&self, handler: &HandlerRef) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        let declared = self
            .handler(handler)
            .into_iter()
            .chain(self.controller(handler))
            .flat_map(|metadata| metadata.scopes.iter());
        for scope in declared {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes
    }

    /// Handler roles when declared, otherwise controller roles
    pub fn roles(&self, handler: &HandlerRef) -> Vec<RoleRequirement> {
        [self.handler(handler), self.controller(handler)]
            .into_iter()
            .flatten()
            .map(|metadata| &metadata.roles)
            .find(|roles| !roles.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_public(&self, handler: &HandlerRef) -> bool {
        [self.handler(handler), self.controller(handler)]
            .into_iter()
            .flatten()
            .any(|metadata| metadata.public)
    }
}
