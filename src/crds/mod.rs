pub mod challenge;
pub mod traefik;

// Re-export types
pub use challenge::{
    Challenge, ChallengeSpec, ExposeKind, Exposure, ExtraExposure, PodDefinition, PodPort,
};
pub use traefik::{
    IngressRoute, IngressRouteSpec, IngressRouteTCP, IngressRouteTCPSpec, Middleware,
    MiddlewareRef, MiddlewareSpec, MiddlewareTCP, MiddlewareTCPSpec, Route, RouteService,
    RouteTls,
};
