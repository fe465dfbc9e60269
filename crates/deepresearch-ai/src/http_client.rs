use std::time::Duration;

use reqwest::Client;

const DISABLE_SYSTEM_PROXY_ENV: &str = "DEEPRESEARCH_DISABLE_SYSTEM_PROXY";
const CONNECT_TIMEOUT_SECS: u64 = 30;

pub(crate) fn build_http_client() -> Client {
    let builder = Client::builder().connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
    let builder = if should_disable_system_proxy() {
        builder.no_proxy()
    } else {
        builder
    };

    builder.build().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Falling back to default reqwest client");
        Client::new()
    })
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}
