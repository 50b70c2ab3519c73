use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error};
use uuid::Uuid;

use super::AppState;
use super::errors::ApiError;
use super::protocol::{
    BatchMetadata, BatchRequest, BatchResponse, ChatInput, ChatOutput, InvokeRequest,
    InvokeResponse, RunMetadata,
};

async fn answer(state: &AppState, input: &ChatInput) -> Result<ChatOutput, ApiError> {
    let answer = state
        .qa
        .handle(&input.question, &input.chat_history)
        .await?;
    Ok(ChatOutput { answer })
}

/// `POST /chat/invoke`
#[inline]
pub async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let Json(request) = payload?;
    let run_id = Uuid::new_v4();
    debug!("Run {} invoked", run_id);

    let output = answer(&state, &request.input).await?;

    Ok(Json(InvokeResponse {
        output,
        metadata: RunMetadata { run_id },
    }))
}

/// `POST /chat/batch`: answers every input, failing as a whole if any input fails
#[inline]
pub async fn batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = payload?;
    debug!("Batch of {} inputs", request.inputs.len());

    let output =
        futures::future::try_join_all(request.inputs.iter().map(|input| answer(&state, input)))
            .await?;
    let run_ids = output.iter().map(|_| Uuid::new_v4()).collect();

    Ok(Json(BatchResponse {
        output,
        metadata: BatchMetadata { run_ids },
    }))
}

/// `POST /chat/stream`: the whole answer as one `data` event between `metadata` and `end`
#[inline]
pub async fn stream(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    let run_id = Uuid::new_v4();

    let mut events = vec![
        Event::default()
            .event("metadata")
            .data(json!({ "run_id": run_id }).to_string()),
    ];

    match answer(&state, &request.input).await {
        Ok(output) => {
            events.push(
                Event::default()
                    .event("data")
                    .data(json!({ "answer": output.answer }).to_string()),
            );
        }
        Err(e) => {
            error!("Streamed run {} failed: {}", run_id, e.message());
            events.push(Event::default().event("error").data(
                json!({ "status_code": e.status().as_u16(), "message": e.message() }).to_string(),
            ));
        }
    }
    events.push(Event::default().event("end"));

    Ok(Sse::new(futures::stream::iter(events.into_iter().map(Ok))).keep_alive(KeepAlive::default()))
}
