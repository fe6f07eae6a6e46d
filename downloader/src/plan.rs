use crate::params::{TransferParams, non_blank};
use crate::template::{self, TemplateValues};
use chrono::{Days, NaiveDate};
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parameters that must be present for every method, in check order.
const MANDATORY: [&str; 8] = [
    "api_url",
    "api_source_name",
    "api_method",
    "root_element",
    "output_bucket",
    "output_folder",
    "project_id",
    "api_secret_id",
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected parameter '{0}' is missing or empty")]
    MissingParameter(&'static str),

    #[error("unsupported api_method '{0}', expected GET or POST")]
    UnsupportedMethod(String),

    #[error("api_json_body is not valid JSON: {0}")]
    InvalidJsonBody(String),

    #[error("no_of_days '{0}' is not a non-negative whole number of days")]
    InvalidNumberOfDays(String),

    #[error("{name} - incorrect date format '{value}', should be YYYY-MM-DD")]
    InvalidDate { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
}

impl ApiMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(ApiMethod::Get),
            "POST" => Ok(ApiMethod::Post),
            other => Err(ValidationError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// How the data request is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// Exchange client id and secret for a bearer token first.
    ClientCredentials { token_url: String, client_id: String },
    /// Send the secret value as the `Authorization` header.
    SecretHeader,
}

/// A validated, fully templated transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub source_name: String,
    pub method: ApiMethod,
    pub url: String,
    pub body: Option<String>,
    pub auth: AuthScheme,
    pub root_element: String,
    pub output_bucket: String,
    pub output_folder: String,
    pub project_id: String,
    pub secret_id: String,
    pub run_date: NaiveDate,
}

impl TransferPlan {
    /// `<output_folder>/<source>_<YYYYMMDD>.json`
    pub fn object_name(&self) -> String {
        format!(
            "{}/{}_{}.json",
            self.output_folder,
            self.source_name,
            self.run_date.format("%Y%m%d")
        )
    }
}

impl TransferParams {
    fn value(&self, name: &str) -> Option<&str> {
        let value = match name {
            "api_url" => &self.api_url,
            "api_source_name" => &self.api_source_name,
            "api_method" => &self.api_method,
            "root_element" => &self.root_element,
            "output_bucket" => &self.output_bucket,
            "output_folder" => &self.output_folder,
            "project_id" => &self.project_id,
            "api_secret_id" => &self.api_secret_id,
            "api_token_url" => &self.api_token_url,
            "api_client_id" => &self.api_client_id,
            "api_json_body" => &self.api_json_body,
            _ => return None,
        };
        non_blank(value)
    }

    fn require(&self, name: &'static str) -> Result<String, ValidationError> {
        self.value(name)
            .map(str::to_string)
            .ok_or(ValidationError::MissingParameter(name))
    }

    /// Validates the parameters and resolves every template, using `today`
    /// for relative date windows and the output file name.
    pub fn into_plan(mut self, today: NaiveDate) -> Result<TransferPlan, ValidationError> {
        let method = non_blank(&self.api_method)
            .map(ApiMethod::from_str)
            .transpose()?;

        if method == Some(ApiMethod::Post) {
            if let Some(body) = non_blank(&self.api_json_body) {
                self.api_json_body = Some(normalize_json_body(body)?);
            }
            self.derive_date_window(today)?;
        }

        for name in MANDATORY {
            if self.value(name).is_none() {
                return Err(ValidationError::MissingParameter(name));
            }
        }
        let Some(method) = method else {
            return Err(ValidationError::MissingParameter("api_method"));
        };

        let auth = match method {
            ApiMethod::Post => {
                let token_url = self.require("api_token_url")?;
                let client_id = self.require("api_client_id")?;
                self.require("api_secret_id")?;
                self.require("api_json_body")?;
                AuthScheme::ClientCredentials {
                    token_url,
                    client_id,
                }
            }
            ApiMethod::Get => {
                self.require("api_secret_id")?;
                AuthScheme::SecretHeader
            }
        };

        let url = self.require("api_url")?;
        let body = self.api_json_body.clone().unwrap_or_default();
        // Only POST bodies take part in templating and its checks.
        let templated_body = match method {
            ApiMethod::Post => Some(body.as_str()),
            ApiMethod::Get => None,
        };
        let is_templated = |key: &str| {
            template::contains_placeholder(&url, key)
                || templated_body.is_some_and(|b| template::contains_placeholder(b, key))
        };

        if is_templated(template::START_DATE) {
            check_date(template::START_DATE, &self.api_start_date)?;
        }
        if is_templated(template::END_DATE) {
            check_date(template::END_DATE, &self.api_end_date)?;
        }
        if templated_body.is_some_and(|b| template::contains_placeholder(b, template::ADVERTISER_ID))
            && non_blank(&self.api_advertiser_id).is_none()
        {
            return Err(ValidationError::MissingParameter(template::ADVERTISER_ID));
        }

        let values = TemplateValues {
            start_date: self.api_start_date.clone(),
            end_date: self.api_end_date.clone(),
            advertiser_id: self.api_advertiser_id.clone(),
        };
        let url = template::substitute(&url, &values);
        let body = match method {
            ApiMethod::Post => template::substitute(&body, &values),
            ApiMethod::Get => body,
        };

        Ok(TransferPlan {
            source_name: self.require("api_source_name")?,
            method,
            url,
            body: (!body.is_empty()).then_some(body),
            auth,
            root_element: self.require("root_element")?,
            output_bucket: self.require("output_bucket")?,
            output_folder: self.require("output_folder")?,
            project_id: self.require("project_id")?,
            secret_id: self.require("api_secret_id")?,
            run_date: today,
        })
    }

    /// With `no_of_days` and no explicit start date, the window becomes
    /// `[today - no_of_days, today]`, replacing any supplied end date.
    fn derive_date_window(&mut self, today: NaiveDate) -> Result<(), ValidationError> {
        let Some(days) = non_blank(&self.no_of_days) else {
            return Ok(());
        };
        if non_blank(&self.api_start_date).is_some() {
            return Ok(());
        }

        let days: u64 = days
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidNumberOfDays(days.to_string()))?;
        let start = today
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| ValidationError::InvalidNumberOfDays(days.to_string()))?;

        self.api_start_date = Some(start.format(DATE_FORMAT).to_string());
        self.api_end_date = Some(today.format(DATE_FORMAT).to_string());
        Ok(())
    }
}

fn normalize_json_body(body: &str) -> Result<String, ValidationError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ValidationError::InvalidJsonBody(e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| ValidationError::InvalidJsonBody(e.to_string()))
}

fn check_date(name: &'static str, value: &Option<String>) -> Result<(), ValidationError> {
    let value = non_blank(value).ok_or(ValidationError::MissingParameter(name))?;
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        name,
        value: value.to_string(),
    })?;
    Ok(())
}
