use crate::errors::{AppError, Result};
use crate::models::PriceDelta;
use crate::stream::{MessageStream, PriceConnector};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use url::Url;

/// Websocket connector for a CoinCap-compatible `prices` feed.
#[derive(Debug, Clone)]
pub struct CoinCapConnector {
    ws_url: String,
}

impl CoinCapConnector {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    /// `{ws_url}?assets=id1,id2,...`
    pub fn stream_url(&self, ids: &[String]) -> Result<Url> {
        let mut url = Url::parse(&self.ws_url)?;
        url.set_query(Some(&format!("assets={}", ids.join(","))));
        Ok(url)
    }
}

#[async_trait]
impl PriceConnector for CoinCapConnector {
    async fn connect(&self, ids: &[String]) -> Result<MessageStream> {
        let url = self.stream_url(ids)?;
        let (ws_stream, _resp) = connect_async(url).await?;
        info!(assets = ids.len(), "[STREAM] websocket connected");

        let mapped = ws_stream.filter_map(|msg_res| async move {
            match msg_res {
                Ok(Message::Text(txt)) => Some(Ok(txt)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "[STREAM] close frame received");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(AppError::ConnectionLost(e.to_string()))),
            }
        });
        Ok(mapped.boxed())
    }
}

/// Decode one feed message, `{"bitcoin":"67012.51","ethereum":"3521.08"}`.
///
/// A message that is not a JSON object is a `Decode` error. Inside a valid
/// object, entries whose price is unparsable, non-finite or negative are
/// dropped one by one.
pub fn decode_prices(text: &str) -> Result<Vec<PriceDelta>> {
    let raw: serde_json::Map<String, Value> = serde_json::from_str(text)?;
    let mut deltas = Vec::with_capacity(raw.len());
    for (id, value) in raw {
        let price = match &value {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        match price {
            Some(p) if p.is_finite() && p >= 0.0 => deltas.push(PriceDelta { id, price: p }),
            _ => debug!(id = %id, value = %value, "[STREAM] malformed price entry dropped"),
        }
    }
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_prices() {
        let deltas = decode_prices(r#"{"bitcoin":"67012.51","ethereum":"3521.08"}"#).unwrap();
        assert_eq!(
            deltas,
            vec![
                PriceDelta {
                    id: "bitcoin".into(),
                    price: 67012.51
                },
                PriceDelta {
                    id: "ethereum".into(),
                    price: 3521.08
                },
            ]
        );
    }

    #[test]
    fn keeps_sub_cent_precision() {
        let deltas = decode_prices(r#"{"shiba-inu":"0.0000243117"}"#).unwrap();
        assert_eq!(deltas[0].price, 0.0000243117);
    }

    #[test]
    fn drops_bad_entries_individually() {
        let deltas = decode_prices(
            r#"{"bitcoin":"abc","ethereum":"3500","solana":null,"sui":"-1","aptos":"NaN","near":5.5}"#,
        )
        .unwrap();
        let ids: Vec<&str> = deltas.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ethereum", "near"]);
    }

    #[test]
    fn non_object_message_is_decode_error() {
        for raw in ["not json", "[1,2]", "\"bitcoin\"", "{\"bitcoin\":"] {
            let err = decode_prices(raw).unwrap_err();
            assert!(matches!(err, AppError::Decode(_)), "{raw}");
        }
    }

    #[test]
    fn url_lists_assets() {
        let connector = CoinCapConnector::new("wss://ws.example.io/prices");
        let url = connector
            .stream_url(&["bitcoin".into(), "avalanche-2".into()])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://ws.example.io/prices?assets=bitcoin,avalanche-2"
        );
    }
}
