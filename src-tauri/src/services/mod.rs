pub mod classifier;
pub mod image_source;
pub mod notifier;
pub mod session;

#[cfg(test)]
pub mod test_http;
