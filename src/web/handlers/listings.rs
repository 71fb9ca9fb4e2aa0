//! Listing creation trigger.
//!
//! The listing record itself belongs to the listing service; this endpoint
//! only announces the new listing on the event stream and returns without
//! waiting for the broker.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::events::ListingCreated;
use crate::logging;
use crate::storage::now_millis;
use crate::web::principal::SessionPrincipal;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    listing_id: String,
    title: String,
    category: String,
    #[serde(default)]
    price: Option<f64>,
}

fn validate(req: &CreateListingRequest) -> Result<(), &'static str> {
    if req.listing_id.trim().is_empty() {
        return Err("listing_id must not be empty");
    }
    if req.title.trim().is_empty() {
        return Err("title must not be empty");
    }
    if req.category.trim().is_empty() {
        return Err("category must not be empty");
    }
    if matches!(req.price, Some(p) if !p.is_finite() || p < 0.0) {
        return Err("price must be a non-negative number");
    }
    Ok(())
}

pub async fn create_listing_handler(
    State(state): State<SharedState>,
    principal: SessionPrincipal,
    axum::Json(req): axum::Json<CreateListingRequest>,
) -> Response {
    if let Err(msg) = validate(&req) {
        return api_error(StatusCode::BAD_REQUEST, msg);
    }

    let event = ListingCreated {
        listing_id: req.listing_id,
        user: principal.username,
        category: req.category,
        title: req.title,
        price: req.price,
        created_at: now_millis(),
    };
    state.publisher.publish_json(&state.listing_topic, &event);
    info!(
        listing = %event.listing_id,
        user = %logging::user_id(&event.user),
        category = %event.category,
        "listing created"
    );

    (StatusCode::CREATED, axum::Json(event)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(listing_id: &str, title: &str, category: &str, price: Option<f64>) -> CreateListingRequest {
        CreateListingRequest {
            listing_id: listing_id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            price,
        }
    }

    #[test]
    fn accepts_listing_without_price() {
        assert!(validate(&request("L1", "Desk lamp", "furniture", None)).is_ok());
    }

    #[test]
    fn rejects_blank_fields_and_bad_prices() {
        assert!(validate(&request(" ", "Desk lamp", "furniture", None)).is_err());
        assert!(validate(&request("L1", "", "furniture", None)).is_err());
        assert!(validate(&request("L1", "Desk lamp", "", None)).is_err());
        assert!(validate(&request("L1", "Desk lamp", "furniture", Some(-1.0))).is_err());
        assert!(validate(&request("L1", "Desk lamp", "furniture", Some(f64::NAN))).is_err());
    }
}
