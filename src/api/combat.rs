//! Combat REST endpoints
//!
//! Every route needs the `x-user-id` header. Ownership rules:
//! - creators may only bring their own characters
//! - reading a combat requires being its DM or owning a combatant
//! - acting or ending a turn requires controlling the actor

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{caller, combat_error_response, error_response, AppState};
use crate::combat::{ActionResult, CharacterSheet, CombatAction, CombatSession};

/// Build combat router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/combat", post(create_combat))
        .route("/api/v1/combat/{id}", get(get_combat))
        .route("/api/v1/combat/{id}/action", post(perform_action))
        .route("/api/v1/combat/{id}/end-turn", post(end_turn))
        .route("/api/v1/combat/{id}/log", get(action_log))
}

/// Request to start an encounter
#[derive(Debug, Deserialize)]
pub struct CreateCombatRequest {
    pub characters: Vec<CharacterSheet>,
    pub monster_ids: Vec<String>,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Deserialize)]
pub struct EndTurnRequest {
    pub actor_id: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action_result: ActionResult,
    pub combat: CombatSession,
}

/// Session for a caller allowed to see it
async fn visible_session(state: &AppState, id: &str, user_id: &str) -> Result<CombatSession, Response> {
    let session = state.combat.get(id).await.map_err(combat_error_response)?;
    if !session.is_user_in_combat(user_id) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "you are not part of this combat",
        ));
    }
    Ok(session)
}

/// Reject callers who don't control `actor_id`. Unknown actors pass
/// through so the engine can report them.
async fn check_control(
    state: &AppState,
    id: &str,
    user_id: &str,
    actor_id: &str,
) -> Result<(), Response> {
    let session = visible_session(state, id, user_id).await?;
    if session.combatant(actor_id).is_some() && !session.user_controls_actor(user_id, actor_id) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            format!("you do not control {}", actor_id),
        ));
    }
    Ok(())
}

async fn create_combat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCombatRequest>,
) -> Response {
    let user_id = match caller(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    if let Some(sheet) = req.characters.iter().find(|c| c.user_id != user_id) {
        return error_response(
            StatusCode::FORBIDDEN,
            format!("character {} does not belong to you", sheet.id),
        );
    }

    match state
        .combat
        .initiate(&user_id, req.characters, &req.monster_ids, &req.environment)
        .await
    {
        Ok(session) => {
            info!(combat = %session.id, user = %user_id, "Combat created via API");
            (StatusCode::CREATED, Json(session)).into_response()
        }
        Err(e) => combat_error_response(e),
    }
}

async fn get_combat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let user_id = match caller(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match visible_session(&state, &id, &user_id).await {
        Ok(session) => Json(session).into_response(),
        Err(response) => response,
    }
}

async fn perform_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(action): Json<CombatAction>,
) -> Response {
    let user_id = match caller(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if let Err(response) = check_control(&state, &id, &user_id, &action.actor_id).await {
        return response;
    }

    match state.combat.execute_action(&id, action).await {
        Ok((action_result, combat)) => Json(ActionResponse {
            action_result,
            combat,
        })
        .into_response(),
        Err(e) => combat_error_response(e),
    }
}

async fn end_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<EndTurnRequest>,
) -> Response {
    let user_id = match caller(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if let Err(response) = check_control(&state, &id, &user_id, &req.actor_id).await {
        return response;
    }

    match state.combat.end_turn(&id, &req.actor_id).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => combat_error_response(e),
    }
}

async fn action_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let user_id = match caller(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if let Err(response) = visible_session(&state, &id, &user_id).await {
        return response;
    }

    match state.combat.action_log(&id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => combat_error_response(e),
    }
}
