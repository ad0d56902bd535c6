//! HTTP account gateway client
//!
//! Talks to an out-of-process accounts service exposing the same gateway
//! endpoints this crate serves (see `api::routes`). Every call is bounded
//! by the client timeout; an unreachable or slow service surfaces as
//! `GatewayError::Unavailable`, never as a hang.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountSnapshot, Amount, Balance};

use super::{AccountGateway, GatewayError};

/// Wire shape of a successful debit/credit response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireBalance {
    pub account_number: String,
    pub balance: Decimal,
}

/// Wire shape of a PIN verification response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WirePinResult {
    pub valid: bool,
}

/// Wire shape of a PIN verification request.
#[derive(Debug, Serialize, Deserialize)]
pub struct WirePinRequest {
    pub pin: String,
}

/// Wire shape of a debit/credit request.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireMutation {
    pub amount: Decimal,
    pub idempotency_key: Uuid,
}

/// Wire shape of a gateway error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireError {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<Decimal>,
}

impl WireError {
    /// Build the wire form of a gateway error.
    pub fn from_gateway_error(err: &GatewayError) -> Self {
        let (error_code, required, available) = match err {
            GatewayError::NotFound(_) => ("account_not_found", None, None),
            GatewayError::Inactive(_) => ("account_inactive", None, None),
            GatewayError::InsufficientFunds {
                required,
                available,
            } => ("insufficient_funds", Some(*required), Some(*available)),
            GatewayError::Unavailable(_) => ("service_unavailable", None, None),
            GatewayError::Database(_) | GatewayError::Internal(_) => ("internal_error", None, None),
        };
        Self {
            error_code: error_code.to_string(),
            message: err.to_string(),
            required,
            available,
        }
    }

    fn into_gateway_error(self, account_number: &str) -> GatewayError {
        match self.error_code.as_str() {
            "account_not_found" => GatewayError::NotFound(account_number.to_string()),
            "account_inactive" => GatewayError::Inactive(account_number.to_string()),
            "insufficient_funds" => GatewayError::InsufficientFunds {
                required: self.required.unwrap_or_default(),
                available: self.available.unwrap_or_default(),
            },
            "service_unavailable" => GatewayError::Unavailable(self.message),
            _ => GatewayError::Internal(self.message),
        }
    }
}

/// Client for a remote accounts service.
#[derive(Debug, Clone)]
pub struct HttpAccountGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountGateway {
    /// `base_url` should include the API prefix, e.g.
    /// `http://accounts.internal:3000/api/v1`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() || err.is_connect() {
            GatewayError::Unavailable(err.to_string())
        } else {
            GatewayError::Internal(err.to_string())
        }
    }

    async fn read_error(
        response: reqwest::Response,
        account_number: &str,
    ) -> GatewayError {
        let status = response.status();
        match response.json::<WireError>().await {
            Ok(wire) => wire.into_gateway_error(account_number),
            Err(_) => GatewayError::Internal(format!(
                "gateway returned {} with unreadable body",
                status
            )),
        }
    }
}

#[async_trait::async_trait]
impl AccountGateway for HttpAccountGateway {
    async fn get_account(&self, account_number: &str) -> Result<AccountSnapshot, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/accounts/{}", account_number)))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response, account_number).await);
        }

        response
            .json::<AccountSnapshot>()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }

    async fn verify_pin(&self, account_number: &str, pin: &str) -> Result<bool, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/accounts/{}/verify-pin", account_number)))
            .json(&WirePinRequest {
                pin: pin.to_string(),
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response, account_number).await);
        }

        let result: WirePinResult = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(result.valid)
    }

    async fn debit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/accounts/{}/debit", account_number)))
            .json(&WireMutation {
                amount: amount.value(),
                idempotency_key,
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response, account_number).await);
        }

        let result: WireBalance = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Balance::new(result.balance).map_err(|e| GatewayError::Internal(e.to_string()))
    }

    async fn credit(
        &self,
        account_number: &str,
        amount: &Amount,
        idempotency_key: Uuid,
    ) -> Result<Balance, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/accounts/{}/credit", account_number)))
            .json(&WireMutation {
                amount: amount.value(),
                idempotency_key,
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response, account_number).await);
        }

        let result: WireBalance = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Balance::new(result.balance).map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_error_round_trip() {
        let err = GatewayError::InsufficientFunds {
            required: Decimal::new(3_000, 0),
            available: Decimal::new(100, 0),
        };
        let wire = WireError::from_gateway_error(&err);
        assert_eq!(wire.error_code, "insufficient_funds");

        let back = wire.into_gateway_error("1001");
        match back {
            GatewayError::InsufficientFunds {
                required,
                available,
            } => {
                assert_eq!(required, Decimal::new(3_000, 0));
                assert_eq!(available, Decimal::new(100, 0));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wire_error_omits_absent_amounts() {
        let wire = WireError::from_gateway_error(&GatewayError::NotFound("1001".to_string()));
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["error_code"], "account_not_found");
        assert!(value.get("required").is_none());
        assert!(value.get("available").is_none());
    }

    #[test]
    fn test_wire_error_inactive() {
        let wire = WireError {
            error_code: "account_inactive".to_string(),
            message: "closed".to_string(),
            required: None,
            available: None,
        };
        assert!(matches!(
            wire.into_gateway_error("1001"),
            GatewayError::Inactive(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway =
            HttpAccountGateway::new("http://localhost:3000/api/v1/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            gateway.url("/accounts/1001"),
            "http://localhost:3000/api/v1/accounts/1001"
        );
    }
}
