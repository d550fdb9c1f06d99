pub async fn ok() -> &'static str {
    "OK"
}
