pub mod interceptor;

pub use interceptor::{InterceptError, TransactionalInterceptor};
