use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Header naming the acting user for mutating requests.
pub const ACTOR_HEADER: &str = "x-campus-actor";

/// Longest accepted actor name.
const MAX_ACTOR_LEN: usize = 128;

/// The acting user, inserted into request extensions by [`actor_middleware`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorContext(pub String);

/// Middleware that requires an `x-campus-actor` header.
///
/// The header only names the actor. Whether the actor may perform the
/// request is decided by the access policy when the mutation runs.
///
/// Rejects with `401 Unauthorized` when the header is missing, empty,
/// not valid UTF-8, or longer than 128 bytes.
pub async fn actor_middleware(mut req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let actor = req
        .headers()
        .get(ACTOR_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .trim()
        .to_string();

    if actor.is_empty() || actor.len() > MAX_ACTOR_LEN {
        return Err(StatusCode::UNAUTHORIZED);
    }

    tracing::debug!(actor = %actor, path = %req.uri().path(), "actor resolved");
    req.extensions_mut().insert(ActorContext(actor));

    Ok(next.run(req).await)
}
