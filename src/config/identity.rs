//! ID & Cookie Service configuration (backs C10).

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Identity {
    /// URL query parameter that, when present and different from the sid
    /// cookie's stored `resetParamValue`, rotates the session (spec §4.6).
    #[serde(default = "Identity::default_reset_param")]
    pub reset_param: String,
}

impl Identity {
    fn default_reset_param() -> String {
        "rp".to_string()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity {
            reset_param: Self::default_reset_param(),
        }
    }
}
