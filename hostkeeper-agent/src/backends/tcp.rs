use super::{TcpOutcome, TcpProber};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Plain TCP connect with a bounded timeout
pub struct SocketProber;

#[async_trait]
impl TcpProber for SocketProber {
    async fn tcp_probe(&self, host: &str, port: u16, timeout: Duration) -> TcpOutcome {
        let outcome = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Err(_) => TcpOutcome::TimedOut,
            Ok(Ok(_stream)) => TcpOutcome::Ok,
            Ok(Err(e)) => classify_connect_error(&e),
        };
        debug!("tcp {}:{} -> {:?}", host, port, outcome);
        outcome
    }
}

fn classify_connect_error(e: &std::io::Error) -> TcpOutcome {
    match e.kind() {
        ErrorKind::ConnectionRefused => TcpOutcome::Refused(e.to_string()),
        ErrorKind::TimedOut => TcpOutcome::TimedOut,
        _ => TcpOutcome::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_is_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = SocketProber
            .tcp_probe("127.0.0.1", port, Duration::from_secs(2))
            .await;
        assert_eq!(outcome, TcpOutcome::Ok);
    }

    #[tokio::test]
    async fn test_closed_port_is_refused() {
        // bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let outcome = SocketProber
            .tcp_probe("127.0.0.1", port, Duration::from_secs(2))
            .await;
        assert!(matches!(outcome, TcpOutcome::Refused(_)));
    }

    #[test]
    fn test_other_errors_are_not_refusals() {
        let e = std::io::Error::new(ErrorKind::Other, "failed to lookup address");
        assert!(matches!(classify_connect_error(&e), TcpOutcome::Error(_)));
    }
}
