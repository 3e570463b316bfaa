//! Wire format for the session gateway: UTF-8 JSON frames of the shape
//! `{ "type": string, "data": object }`, both inbound (client → server) and
//! outbound (server → client).

use serde::{
    Deserialize,
    Serialize,
};

use crate::auction::{
    ids::{
        Status,
        TeamId,
        UserId,
    },
    team::Team,
};

/// A raw inbound frame before its `data` payload has been interpreted. Kept
/// separate from a single tagged enum so that an unrecognized `type` can be
/// silently ignored (per §6) rather than failing to deserialize the whole
/// frame.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundEnvelope {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaceBidData {
    pub(crate) amount: i64,
}

/// A fully-parsed inbound command understood by the auction core.
#[derive(Debug)]
pub(crate) enum Inbound {
    PlaceBid { amount: i64 },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum InboundParseError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("malformed `data` for `{kind}`: {source}")]
    MalformedData {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    /// Not an error condition as far as the client is concerned: unknown
    /// message types are ignored, not rejected (§6).
    Ignored,
}

pub(crate) fn parse(raw: &str) -> Result<Inbound, InboundParseError> {
    let envelope: InboundEnvelope = serde_json::from_str(raw)?;
    match envelope.kind.as_str() {
        "place_bid" => {
            let data: PlaceBidData = serde_json::from_value(envelope.data).map_err(|source| {
                InboundParseError::MalformedData {
                    kind: envelope.kind.clone(),
                    source,
                }
            })?;
            Ok(Inbound::PlaceBid {
                amount: data.amount,
            })
        }
        _ => Err(InboundParseError::Ignored),
    }
}

/// A team snapshot merged with the identity of the client it is addressed
/// to, sent once as the `init` reply to a successful handshake.
#[derive(Debug, Serialize)]
pub(crate) struct ClientIdentity {
    pub(crate) user_id: UserId,
    pub(crate) team_id: Option<TeamId>,
    pub(crate) is_leader: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub(crate) enum Outbound {
    Init {
        status: Status,
        teams: Vec<Team>,
        auction_queue: Vec<UserId>,
        unsold_queue: Vec<UserId>,
        current_user_id: Option<UserId>,
        current_bid: Option<u32>,
        current_bidder: Option<TeamId>,
        timer: Option<u64>,
        #[serde(flatten)]
        identity: ClientIdentity,
    },
    Status {
        status: Status,
    },
    NextUser {
        user_id: UserId,
    },
    QueueUpdate {
        auction_queue: Vec<UserId>,
        unsold_queue: Vec<UserId>,
    },
    Timer {
        timer: u64,
    },
    BidPlaced {
        team_id: TeamId,
        leader_id: UserId,
        amount: u32,
    },
    UserSold {
        teams: Vec<Team>,
    },
    UserUnsold {},
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_bid_parses() {
        let raw = r#"{"type":"place_bid","data":{"amount":10}}"#;
        match parse(raw).unwrap() {
            Inbound::PlaceBid { amount } => assert_eq!(amount, 10),
        }
    }

    #[test]
    fn unknown_type_is_ignored_not_an_error_to_the_client() {
        let raw = r#"{"type":"ping","data":{}}"#;
        assert!(matches!(parse(raw), Err(InboundParseError::Ignored)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let raw = "not json";
        assert!(matches!(
            parse(raw),
            Err(InboundParseError::MalformedFrame(_))
        ));
    }

    #[test]
    fn place_bid_with_bad_data_is_an_error() {
        let raw = r#"{"type":"place_bid","data":{"amount":"ten"}}"#;
        assert!(matches!(
            parse(raw),
            Err(InboundParseError::MalformedData { .. })
        ));
    }

    #[test]
    fn outbound_serializes_with_tag_and_content() {
        let msg = Outbound::UserUnsold {};
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "user_unsold");
    }

    #[test]
    fn bid_placed_serializes_expected_fields() {
        let msg = Outbound::BidPlaced {
            team_id: TeamId::new(1),
            leader_id: UserId::from(5),
            amount: 10,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "bid_placed");
        assert_eq!(json["data"]["amount"], 10);
    }
}
