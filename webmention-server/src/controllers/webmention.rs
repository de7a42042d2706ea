use axum::Json;
use axum::extract::{Query, State};
use webmention_core::Direction;

use crate::error::AppError;
use crate::types::{
    AppState, ListWebmentionsParams, WebmentionAcceptedResponse, WebmentionRequest, WebmentionView,
};

pub(super) async fn receive(
    State(state): State<AppState>,
    axum::Form(payload): axum::Form<WebmentionRequest>,
) -> Result<Json<WebmentionAcceptedResponse>, AppError> {
    state
        .services
        .webmention
        .process(&payload.source, &payload.target)
        .await?;
    Ok(Json(WebmentionAcceptedResponse { status: "ok" }))
}

pub(super) async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListWebmentionsParams>,
) -> Result<Json<Vec<WebmentionView>>, AppError> {
    let direction = Direction::from_raw(&params.direction)
        .ok_or_else(|| AppError::bad_request("direction must be 'incoming' or 'outgoing'"))?;

    let mentions = state.services.webmention.list(&params.resource, direction).await?;
    Ok(Json(mentions.into_iter().map(WebmentionView::from).collect()))
}
