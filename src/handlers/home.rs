pub async fn home_handler() -> &'static str {
    "Traffic monitor with Redis rate limiting is running!"
}
