//! Dual-channel response reading.
//!
//! [`ResponseReader`] reads the primary channel of an exchange and hands it to
//! the codec. If the primary channel fails at the I/O level it falls back to
//! the error channel. The declared content encoding is undone identically on
//! both channels.

use jsonrpc_http_core::RpcCodec;

use crate::error::ClientError;
use crate::exchange::Exchange;

/// Reads and decodes the response of one exchange.
#[derive(Debug)]
pub struct ResponseReader<'a, C> {
    codec: &'a C,
    max_size: Option<usize>,
}

impl<'a, C: RpcCodec> ResponseReader<'a, C> {
    pub fn new(codec: &'a C) -> Self {
        Self {
            codec,
            max_size: None,
        }
    }

    /// Treat a channel whose decompressed body exceeds `max_size` bytes as
    /// unreadable.
    pub fn max_size(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Read the response.
    ///
    /// - A readable primary channel is decoded; codec errors propagate as
    ///   they are and the error channel is never touched.
    /// - Otherwise the error channel is read. If it decodes, that result is
    ///   returned.
    /// - An error channel that was read but does not decode yields
    ///   [`ClientError::Protocol`] with its bytes.
    /// - An error channel that cannot be read yields
    ///   [`ClientError::Transport`] wrapping the primary channel failure.
    pub async fn read<E: Exchange>(&self, exchange: &mut E) -> Result<C::Response, ClientError> {
        let encoding = exchange.content_encoding();

        let primary_failure = match exchange
            .read_primary()
            .await
            .and_then(|body| encoding.decode(body, self.max_size))
        {
            Ok(body) => return self.codec.decode_response(&body).map_err(ClientError::from),
            Err(err) => err,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = ?exchange.status(),
            error = %primary_failure,
            "primary channel unreadable, reading error channel"
        );

        let raw = match exchange.read_error().await {
            Ok(raw) => raw,
            Err(_fallback_failure) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_fallback_failure, "error channel unreadable");
                return Err(ClientError::transport(
                    "no readable response channel",
                    primary_failure,
                ));
            }
        };

        let body = match encoding.decode(raw.clone(), self.max_size) {
            Ok(body) => body,
            Err(_) => {
                return Err(ClientError::Protocol {
                    status: exchange.status(),
                    body: raw,
                });
            }
        };
        self.codec
            .decode_response(&body)
            .map_err(|_| ClientError::Protocol {
                status: exchange.status(),
                body,
            })
    }
}
