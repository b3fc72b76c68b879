use serde::{Deserialize, Serialize};

/// A candidate record as served by the pipeline API.
///
/// The `id` is assigned by the server and never changes; `company` is set
/// once a candidate has been hired and is the field rewritten by
/// [`CandidateCache::hire`](crate::cache::CandidateCache::hire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub job: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

impl Candidate {
    /// Full display name, "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Return this candidate with `company` set, leaving everything else as-is
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn is_hired(&self) -> bool {
        self.company.is_some()
    }
}
