//! Postgres catalog connection settings (backs C2).

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Catalog {
    #[serde(default = "Catalog::default_connection_string")]
    pub connection_string: String,
}

impl Catalog {
    fn default_connection_string() -> String {
        "host=127.0.0.1 user=postgres dbname=numpool".to_string()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog {
            connection_string: Self::default_connection_string(),
        }
    }
}
