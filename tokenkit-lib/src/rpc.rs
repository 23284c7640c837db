//! Typed requests and responses exchanged with the platform.

use serde::{Deserialize, Serialize};

use crate::member::{MemberRecord, MemberUpdate, UpdateSignature};
use crate::token::{Token, TokenOperationResult, TokenPayload, TokenSignature};
use crate::MemberId;

/// A call to the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    /// Reserve a member id for a pending username.
    CreateMember { username: String },
    GetMember { member_id: MemberId },
    UpdateMember {
        update: MemberUpdate,
        update_signature: UpdateSignature,
    },
    CreateToken { payload: TokenPayload },
    GetToken { token_id: String },
    EndorseToken {
        token_id: String,
        signature: TokenSignature,
    },
    CancelToken {
        token_id: String,
        signature: TokenSignature,
    },
    /// Cancel `token_id` and create `payload` in one step.
    ReplaceToken {
        token_id: String,
        cancel_signature: TokenSignature,
        payload: TokenPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endorse_signature: Option<TokenSignature>,
    },
}

impl Request {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateMember { .. } => "create_member",
            Self::GetMember { .. } => "get_member",
            Self::UpdateMember { .. } => "update_member",
            Self::CreateToken { .. } => "create_token",
            Self::GetToken { .. } => "get_token",
            Self::EndorseToken { .. } => "endorse_token",
            Self::CancelToken { .. } => "cancel_token",
            Self::ReplaceToken { .. } => "replace_token",
        }
    }
}

/// A successful platform reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Response {
    MemberCreated { member_id: MemberId },
    Member(MemberRecord),
    Token(Token),
    TokenOperation(TokenOperationResult),
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemberCreated { .. } => "member_created",
            Self::Member(_) => "member",
            Self::Token(_) => "token",
            Self::TokenOperation(_) => "token_operation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged() {
        let json = serde_json::to_value(Request::GetToken {
            token_id: "tt:1".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "get_token");
        assert_eq!(json["payload"]["token_id"], "tt:1");
    }

    #[test]
    fn response_round_trips_member() {
        let response = Response::Member(MemberRecord::empty(MemberId::new("m:1")));
        let text = serde_json::to_string(&response).unwrap();
        let back: Response = serde_json::from_str(&text).unwrap();
        assert_eq!(back, response);
        assert_eq!(back.name(), "member");
    }
}
