//! Request and response types of the proof retrieval endpoint.
use serde::{Deserialize, Serialize};

use super::{
    errors::{ErrorKind, RegistryError},
    hasher::FieldHasher,
    proof::WireProof,
    service::ProofService,
    ElectionId,
};

/// Sent by an authenticated voting client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub election_id: ElectionId,
    pub voter_identifier: String,
}

///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&RegistryError> for ErrorResponse {
    fn from(err: &RegistryError) -> Self {
        ErrorResponse {
            error: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Either the proof or one named error kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofResponse {
    Proof(WireProof),
    Error(ErrorResponse),
}

/// Serves one request. Every failure is mapped to an [`ErrorResponse`].
pub fn handle_proof_request<H: FieldHasher>(
    service: &ProofService<H>,
    request: &ProofRequest,
) -> ProofResponse {
    match service.get_wire_proof(request.election_id, &request.voter_identifier) {
        Ok(proof) => ProofResponse::Proof(proof),
        Err(err) => {
            tracing::info!(
                election_id = request.election_id,
                kind = err.kind().as_str(),
                "proof request failed"
            );
            ProofResponse::Error(ErrorResponse::from(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::{
        InMemoryRegistryContract, LeafEncoder, MemoryAuditSink, PoseidonHasher, ProofCodec,
        SledMirrorStore, VoterRegistrySync,
    };

    fn service_with(ids: &[&str]) -> ProofService {
        let contract = Arc::new(InMemoryRegistryContract::new());
        let mirror = Arc::new(SledMirrorStore::temporary().unwrap());
        VoterRegistrySync::new(
            contract.clone(),
            mirror.clone(),
            Arc::new(MemoryAuditSink::new()),
            LeafEncoder::new(PoseidonHasher),
        )
        .register_batch(1, ids)
        .unwrap();
        ProofService::new(
            contract,
            mirror,
            LeafEncoder::new(PoseidonHasher),
            ProofCodec::default(),
        )
    }

    #[test]
    fn request_uses_camel_case() {
        let request: ProofRequest =
            serde_json::from_str(r#"{"electionId": 4, "voterIdentifier": "0x01"}"#).unwrap();
        assert_eq!(request.election_id, 4);
        assert_eq!(request.voter_identifier, "0x01");
    }

    #[test]
    fn registered_voter_gets_the_wire_proof() {
        let a = format!("0x{:064x}", 1);
        let b = format!("0x{:064x}", 2);
        let service = service_with(&[&a, &b]);
        let response = handle_proof_request(
            &service,
            &ProofRequest {
                election_id: 1,
                voter_identifier: b,
            },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["merklePath"].as_array().unwrap().len(), 1);
        assert!(json["merklePathIndices"][0].is_u64());
        assert!(json["merkleRoot"].as_str().unwrap().starts_with("0x"));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failures_carry_a_kind_code() {
        let a = format!("0x{:064x}", 1);
        let stranger = format!("0x{:064x}", 9);
        let service = service_with(&[&a]);

        let cases = [
            (1, "not hex", "invalid_identifier_format"),
            (1, stranger.as_str(), "not_registered"),
            (2, a.as_str(), "no_registry_for_election"),
        ];
        for (election_id, identifier, code) in cases {
            let response = handle_proof_request(
                &service,
                &ProofRequest {
                    election_id,
                    voter_identifier: identifier.to_string(),
                },
            );
            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["error"], code);
            assert!(json["message"].is_string());
        }
    }
}
