use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::controller::Core;

use super::error::ApiError;
use super::extract::ValidatedJson;
use super::response::ApiResponse;

fn validate<T: Validate>(body: &T) -> Result<(), ApiError> {
    body.validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))
}

pub fn router() -> Router<Core> {
    Router::new()
        .route("/core", get(get_core))
        .route("/surplus", get(get_surplus))
        .route("/devices", get(list_devices))
        .route("/device/:name", get(get_device))
        .route("/device/:name/consumption", get(get_device_consumption))
        .route("/surplus_margin", post(set_surplus_margin))
        .route("/grid_margin", post(set_grid_margin))
        .route("/idle_power", post(set_idle_power))
        .route(
            "/device/:name/max_consumption",
            post(set_device_max_consumption),
        )
        .route(
            "/device/:name/expected_consumption",
            post(set_device_expected_consumption),
        )
        .route("/device/:name/cooldown", post(set_device_cooldown))
}

#[derive(Debug, Serialize)]
struct CoreView {
    surplus: f64,
    surplus_margin: f64,
    grid_margin: f64,
    idle_power: f64,
}

async fn get_core(State(core): State<Core>) -> ApiResponse<CoreView> {
    let tunables = core.tunables().await;
    ApiResponse::success(CoreView {
        surplus: core.surplus().await,
        surplus_margin: tunables.surplus_margin,
        grid_margin: tunables.grid_margin,
        idle_power: tunables.idle_power,
    })
}

#[derive(Debug, Serialize)]
struct SurplusView {
    surplus: f64,
}

async fn get_surplus(State(core): State<Core>) -> ApiResponse<SurplusView> {
    ApiResponse::success(SurplusView {
        surplus: core.surplus().await,
    })
}

async fn list_devices(State(core): State<Core>) -> ApiResponse<Vec<crate::domain::DeviceSnapshot>> {
    ApiResponse::success(core.devices().await)
}

async fn get_device(
    State(core): State<Core>,
    Path(name): Path<String>,
) -> Result<ApiResponse<crate::domain::DeviceSnapshot>, ApiError> {
    core.device(&name)
        .await
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::NotFound(format!("no such device: {name}")))
}

#[derive(Debug, Serialize)]
struct ConsumptionView {
    consumption: f64,
}

async fn get_device_consumption(
    State(core): State<Core>,
    Path(name): Path<String>,
) -> Result<ApiResponse<ConsumptionView>, ApiError> {
    core.device(&name)
        .await
        .map(|snap| {
            ApiResponse::success(ConsumptionView {
                consumption: snap.consumption,
            })
        })
        .ok_or_else(|| ApiError::NotFound(format!("no such device: {name}")))
}

#[derive(Debug, Deserialize, Validate)]
struct SurplusMarginBody {
    #[validate(range(min = 0.0))]
    surplus_margin: f64,
}

async fn set_surplus_margin(
    State(core): State<Core>,
    ValidatedJson(body): ValidatedJson<SurplusMarginBody>,
) -> Result<ApiResponse<()>, ApiError> {
    validate(&body)?;
    core.set_surplus_margin(body.surplus_margin).await;
    Ok(ApiResponse::success(()))
}

#[derive(Debug, Deserialize, Validate)]
struct GridMarginBody {
    #[validate(range(min = 0.0))]
    grid_margin: f64,
}

async fn set_grid_margin(
    State(core): State<Core>,
    ValidatedJson(body): ValidatedJson<GridMarginBody>,
) -> Result<ApiResponse<()>, ApiError> {
    validate(&body)?;
    core.set_grid_margin(body.grid_margin).await;
    Ok(ApiResponse::success(()))
}

#[derive(Debug, Deserialize, Validate)]
struct IdlePowerBody {
    #[validate(range(min = 0.0))]
    idle_power: f64,
}

async fn set_idle_power(
    State(core): State<Core>,
    ValidatedJson(body): ValidatedJson<IdlePowerBody>,
) -> Result<ApiResponse<()>, ApiError> {
    validate(&body)?;
    core.set_idle_power(body.idle_power).await;
    Ok(ApiResponse::success(()))
}

#[derive(Debug, Deserialize, Validate)]
struct MaxConsumptionBody {
    #[validate(range(min = 0.0))]
    max_consumption: Option<f64>,
}

async fn set_device_max_consumption(
    State(core): State<Core>,
    Path(name): Path<String>,
    ValidatedJson(body): ValidatedJson<MaxConsumptionBody>,
) -> Result<ApiResponse<()>, ApiError> {
    validate(&body)?;
    if core
        .set_device_max_consumption(&name, body.max_consumption)
        .await
    {
        Ok(ApiResponse::success(()))
    } else {
        Err(ApiError::NotFound(format!("no such device: {name}")))
    }
}

#[derive(Debug, Deserialize, Validate)]
struct ExpectedConsumptionBody {
    #[validate(range(min = 0.0))]
    expected_consumption: f64,
}

async fn set_device_expected_consumption(
    State(core): State<Core>,
    Path(name): Path<String>,
    ValidatedJson(body): ValidatedJson<ExpectedConsumptionBody>,
) -> Result<ApiResponse<()>, ApiError> {
    validate(&body)?;
    if core
        .set_device_expected_consumption(&name, body.expected_consumption)
        .await
    {
        Ok(ApiResponse::success(()))
    } else {
        Err(ApiError::NotFound(format!("no such device: {name}")))
    }
}

#[derive(Debug, Deserialize)]
struct CooldownBody {
    cooldown: Option<u64>,
}

async fn set_device_cooldown(
    State(core): State<Core>,
    Path(name): Path<String>,
    ValidatedJson(body): ValidatedJson<CooldownBody>,
) -> Result<ApiResponse<()>, ApiError> {
    if core.set_device_cooldown(&name, body.cooldown).await {
        Ok(ApiResponse::success(()))
    } else {
        Err(ApiError::NotFound(format!("no such device: {name}")))
    }
}
