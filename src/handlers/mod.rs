pub mod agents;
pub mod customer;
pub mod deliveries;
pub mod issues;
pub mod settings;



#[cfg(test)]
mod customer_http_tests;

pub use agents::configure_agent_routes;
pub use customer::configure_customer_routes;
pub use deliveries::configure_delivery_routes;
pub use issues::configure_issue_routes;
pub use settings::configure_settings_routes;

use actix_web::web;

/// Register the full route tree on a scope. Mounted once per URL
/// prefix so `/delivery/...` and `/delivery-new/...` serve identical
/// routes.
pub fn configure_all_routes(cfg: &mut web::ServiceConfig) {
    configure_delivery_routes(cfg);
    configure_issue_routes(cfg);
    configure_agent_routes(cfg);
    configure_customer_routes(cfg);
    configure_settings_routes(cfg);
}
