// keysync-api: Async Rust client for the subscription control-plane.

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::ControlPlaneClient;
pub use error::Error;
pub use models::{
    IssuedKey, LoginResponse, PaymentInfo, PaymentReceipt, PaymentSlip, PlanCatalog,
    ProtocolPlan, SupportInfo, UserStatus,
};
pub use transport::TransportConfig;
