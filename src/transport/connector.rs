// Socket factory. Production uses tokio-tungstenite; tests plug in scripted sockets.

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::{self, Message};

use super::TransportError;

/// A full-duplex WebSocket frame channel.
pub trait Socket:
    Stream<Item = Result<Message, tungstenite::Error>>
    + Sink<Message, Error = tungstenite::Error>
    + Send
    + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Send
        + Unpin
{
}

pub type BoxSocket = Box<dyn Socket>;

/// Opens one socket per call. The transport calls it once per connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxSocket, TransportError>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxSocket, TransportError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (stream, response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(TransportError::Connect)?;
            tracing::debug!(status = %response.status(), "websocket handshake complete");
            Ok(Box::new(stream) as BoxSocket)
        })
    }
}
