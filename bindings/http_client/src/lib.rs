mod check;
mod client;

pub mod prelude {
    pub use crate::check::Check;
    pub use crate::client::{HttpClientConfig, InstrumentedHttpClient, ResponseSummary};
}
