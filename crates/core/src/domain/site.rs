use serde::{Deserialize, Serialize};

use crate::domain::request::Division;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub String);

/// A site work assignment created by Top Management during import.
/// Read-only from the request engine's perspective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAssignment {
    pub site_id: SiteId,
    pub site_name: String,
    pub region: String,
    pub city: String,
    pub rpm: String,
    pub pic: String,
    pub division: Division,
}
