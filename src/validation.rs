use crate::dates;
use crate::error::{Result, WarrantyError};
use crate::models::WarrantyInput;

/// Longest client name accepted
const MAX_CLIENT_NAME_LEN: usize = 100;

/// Validation utilities for create-workflow input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate every required field of a new warranty
    pub fn validate_warranty_input(input: &WarrantyInput) -> Result<()> {
        Self::validate_client_name(&input.client_name)?;
        Self::validate_phone(&input.client_phone)?;
        Self::validate_exchange_date(&input.exchange_date)?;
        Self::validate_warranty_days(input.warranty_days)?;

        if let Some(uri) = &input.image_uri {
            if uri.trim().is_empty() {
                return Err(WarrantyError::Validation("Image reference cannot be blank".into()));
            }
        }

        Ok(())
    }

    /// Validate client name
    pub fn validate_client_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(WarrantyError::Validation("Client name cannot be empty".into()));
        }

        if name.chars().count() > MAX_CLIENT_NAME_LEN {
            return Err(WarrantyError::Validation(format!(
                "Client name too long (max {MAX_CLIENT_NAME_LEN} characters)"
            )));
        }

        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(WarrantyError::Validation(
                "Client name contains invalid characters".into(),
            ));
        }

        Ok(())
    }

    /// Validate client phone. Only presence is required; formats vary by region.
    pub fn validate_phone(phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return Err(WarrantyError::Validation("Phone number cannot be empty".into()));
        }

        if !phone.chars().any(|c| c.is_ascii_digit()) {
            return Err(WarrantyError::Validation("Phone number must contain digits".into()));
        }

        Ok(())
    }

    /// Validate the exchange date is present and parseable
    pub fn validate_exchange_date(exchange_date: &str) -> Result<()> {
        if exchange_date.trim().is_empty() {
            return Err(WarrantyError::Validation("Exchange date cannot be empty".into()));
        }

        dates::parse_date_like(exchange_date)
            .map(|_| ())
            .map_err(|_| WarrantyError::Validation(format!("Invalid exchange date: {exchange_date}")))
    }

    /// Validate warranty period
    pub fn validate_warranty_days(days: i32) -> Result<()> {
        if days <= 0 {
            return Err(WarrantyError::Validation(
                "Warranty period must be a positive number of days".into(),
            ));
        }

        Ok(())
    }
}
