//! Ghost counts per peer.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Serialize)]
pub struct ReputationResponse {
    pub peers: Vec<GhostCount>,
    pub total: u64,
}

#[derive(Serialize)]
pub struct GhostCount {
    pub peer: String,
    pub ghosts: u64,
}

pub async fn handle_reputation(State(state): State<ApiState>) -> Json<ReputationResponse> {
    let peers = state
        .node
        .reputation
        .list()
        .into_iter()
        .map(|(peer, ghosts)| GhostCount {
            peer: peer.to_string(),
            ghosts,
        })
        .collect();

    Json(ReputationResponse {
        peers,
        total: state.node.reputation.total(),
    })
}
