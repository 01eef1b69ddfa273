pub(crate) mod audit;
pub(crate) mod handler;
pub(crate) mod http;
pub(crate) mod logging;
pub(crate) mod oneshot;
pub(crate) mod server;

pub(crate) use audit::AuditLog;
pub(crate) use handler::RiskService;
pub(crate) use http::serve_http;
pub(crate) use logging::init_tracing;
pub(crate) use oneshot::run_once;
pub(crate) use server::spawn_accept_loop;
