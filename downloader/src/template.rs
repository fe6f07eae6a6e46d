//! `@name` placeholder substitution for endpoint URLs and request bodies.

pub const START_DATE: &str = "api_start_date";
pub const END_DATE: &str = "api_end_date";
pub const ADVERTISER_ID: &str = "api_advertiser_id";

/// Values substituted into templates. Unset values substitute as the empty
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub advertiser_id: Option<String>,
}

impl TemplateValues {
    fn entries(&self) -> [(&'static str, &str); 3] {
        [
            (START_DATE, self.start_date.as_deref().unwrap_or_default()),
            (END_DATE, self.end_date.as_deref().unwrap_or_default()),
            (ADVERTISER_ID, self.advertiser_id.as_deref().unwrap_or_default()),
        ]
    }
}

pub fn contains_placeholder(text: &str, key: &str) -> bool {
    text.contains(&format!("@{key}"))
}

pub fn substitute(text: &str, values: &TemplateValues) -> String {
    let mut out = text.to_string();
    for (key, value) in values.entries() {
        let placeholder = format!("@{key}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, value);
        }
    }
    out
}
