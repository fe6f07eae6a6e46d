use std::borrow::Cow;

/// Raw request parameters, before any validation.
///
/// Absent and whitespace-only values are treated the same way by the
/// validation step, so every field is kept optional here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferParams {
    pub api_url: Option<String>,
    pub api_source_name: Option<String>,
    pub api_method: Option<String>,
    pub root_element: Option<String>,
    pub output_bucket: Option<String>,
    pub output_folder: Option<String>,
    pub project_id: Option<String>,
    pub api_secret_id: Option<String>,
    pub api_token_url: Option<String>,
    pub api_advertiser_id: Option<String>,
    pub api_client_id: Option<String>,
    pub api_json_body: Option<String>,
    pub no_of_days: Option<String>,
    pub api_start_date: Option<String>,
    pub api_end_date: Option<String>,
}

impl TransferParams {
    /// Decodes an `application/x-www-form-urlencoded` query string.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Builds the parameters from decoded key/value pairs. Unknown keys are
    /// ignored and a repeated key keeps its last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = TransferParams::default();
        for (key, value) in pairs {
            if let Some(slot) = params.slot_mut(key.as_ref()) {
                *slot = Some(value.into());
            } else {
                tracing::debug!(key = key.as_ref(), "ignoring unknown parameter");
            }
        }
        params
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        let slot = match name {
            "api_url" => &mut self.api_url,
            "api_source_name" => &mut self.api_source_name,
            "api_method" => &mut self.api_method,
            "root_element" => &mut self.root_element,
            "output_bucket" => &mut self.output_bucket,
            "output_folder" => &mut self.output_folder,
            "project_id" => &mut self.project_id,
            "api_secret_id" => &mut self.api_secret_id,
            "api_token_url" => &mut self.api_token_url,
            "api_advertiser_id" => &mut self.api_advertiser_id,
            "api_client_id" => &mut self.api_client_id,
            "api_json_body" => &mut self.api_json_body,
            "no_of_days" => &mut self.no_of_days,
            "api_start_date" => &mut self.api_start_date,
            "api_end_date" => &mut self.api_end_date,
            _ => return None,
        };
        Some(slot)
    }
}

/// Returns the value unless it is absent or whitespace-only.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl<'a> FromIterator<(Cow<'a, str>, Cow<'a, str>)> for TransferParams {
    fn from_iter<T: IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
