use axum::response::IntoResponse;

// axum handler for the root banner, doubles as a liveness check
pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::body::to_bytes;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn root_returns_app_banner() -> Result<()> {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let banner = String::from_utf8(body.to_vec())?;
        assert!(banner.starts_with(env!("CARGO_PKG_NAME")));
        Ok(())
    }
}
