//! Frontend-side codec, for driving a server from tests and tooling.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::codec::{DEFAULT_MAX_MESSAGE_SIZE, split_typed_message};
use crate::protocol::{BackendMessage, FrontendMessage, ProtocolError, StartupMessage};

/// Encodes startup and frontend messages, decodes backend messages.
///
/// The single-byte reply to an SSLRequest is not framed; callers negotiating
/// SSL read it from the raw stream before wrapping it in this codec.
#[derive(Debug, Default)]
pub struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = BackendMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_typed_message(src, DEFAULT_MAX_MESSAGE_SIZE)? {
            Some((tag, mut body)) => BackendMessage::decode(tag, &mut body).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<StartupMessage> for ClientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: StartupMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

impl Encoder<FrontendMessage> for ClientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: FrontendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PostgresCodec, TransactionStatus};

    #[test]
    fn test_server_messages_decode_on_client() {
        let mut server = PostgresCodec::new();
        let mut client = ClientCodec;
        let mut wire = BytesMut::new();

        let sent = vec![
            BackendMessage::AuthenticationMd5Password { salt: [9, 8, 7, 6] },
            BackendMessage::DataRow {
                values: vec![Some("Alice".to_string()), None],
            },
            BackendMessage::ReadyForQuery {
                status: TransactionStatus::Idle,
            },
        ];
        for msg in sent.clone() {
            server.encode(msg, &mut wire).unwrap();
        }

        let mut received = Vec::new();
        while let Some(msg) = client.decode(&mut wire).unwrap() {
            received.push(msg);
        }
        assert_eq!(received, sent);
    }

    #[test]
    fn test_client_query_decodes_on_server() {
        let mut server = PostgresCodec::new();
        let mut wire = BytesMut::new();
        ClientCodec
            .encode(FrontendMessage::Query("select 1".to_string()), &mut wire)
            .unwrap();

        let msg = server.decode(&mut wire).unwrap();
        assert_eq!(msg, Some(FrontendMessage::Query("select 1".to_string())));
    }
}
