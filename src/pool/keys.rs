//! Store key layout (authoritative — spec §6 "Store key layout").

pub fn free_set(pool_id: i64) -> String {
    format!("Pool: {pool_id} / Free")
}

pub fn taken_zset(pool_id: i64) -> String {
    format!("Pool: {pool_id} / Taken")
}

pub fn sid_number_hash(pool_id: i64) -> String {
    format!("Pool: {pool_id} / SID Number Hash")
}

pub fn pool_lock(pool_id: i64) -> String {
    format!("Pool: {pool_id} / Lock")
}

pub const INIT_LOCK: &str = "Pool Init";

pub fn pool_properties(pool_id: i64) -> String {
    format!("pool_properties:{pool_id}")
}

/// Number contexts are stored under the bare number string as key.
pub fn number_context(number: &str) -> String {
    number.to_string()
}

pub fn route(call_from: &str, call_to: &str) -> String {
    format!("{call_from}->{call_to}")
}

pub fn user_context(id_type: &str, user_id: &str) -> String {
    format!("{id_type}:{user_id}")
}

pub fn static_number(number: &str) -> String {
    format!("static:{number}")
}
