//! Server access-log integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;

    use crate::{LOG_BUCKET, LOGGED_BUCKET, s3_client, test_bucket_name, wait_for_log_line};

    async fn ensure_logged_bucket(client: &aws_sdk_s3::Client) {
        if client.head_bucket().bucket(LOGGED_BUCKET).send().await.is_err() {
            client
                .create_bucket()
                .bucket(LOGGED_BUCKET)
                .send()
                .await
                .expect("create logged bucket");
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_deliver_object_requests_to_log_bucket() {
        let client = s3_client();
        ensure_logged_bucket(&client).await;

        let key = format!("{}.txt", test_bucket_name("log"));
        client
            .put_object()
            .bucket(LOGGED_BUCKET)
            .key(&key)
            .body(ByteStream::from_static(b"logged"))
            .send()
            .await
            .expect("put_object");

        let line = wait_for_log_line(&client, LOG_BUCKET, &format!("REST.PUT.OBJECT {key} "))
            .await
            .expect("access-log line for the upload");
        assert!(line.starts_with(&format!("- {LOGGED_BUCKET} [")));
        assert!(line.contains(&format!("\"PUT /{LOGGED_BUCKET}/{key}")));
        assert!(line.contains(" 200 - "));

        let _ = client.delete_object().bucket(LOGGED_BUCKET).key(&key).send().await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_log_copy_source_read_before_copy() {
        let client = s3_client();
        ensure_logged_bucket(&client).await;

        let src = format!("{}.src", test_bucket_name("copy"));
        let dst = format!("{}.dst", test_bucket_name("copy"));
        client
            .put_object()
            .bucket(LOGGED_BUCKET)
            .key(&src)
            .body(ByteStream::from_static(b"payload"))
            .send()
            .await
            .expect("put_object");
        client
            .copy_object()
            .bucket(LOGGED_BUCKET)
            .key(&dst)
            .copy_source(format!("{LOGGED_BUCKET}/{src}"))
            .send()
            .await
            .expect("copy_object");

        let line = wait_for_log_line(&client, LOG_BUCKET, &format!("REST.COPY.OBJECT_GET {src} "))
            .await
            .expect("copy source line");
        assert!(line.contains(&format!("\"PUT /{LOGGED_BUCKET}/{dst}")));

        for key in [&src, &dst] {
            let _ = client.delete_object().bucket(LOGGED_BUCKET).key(key).send().await;
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_not_log_unselected_buckets() {
        let client = s3_client();
        let bucket = crate::create_test_bucket(&client, "quiet").await;
        client
            .put_object()
            .bucket(&bucket)
            .key("silent.txt")
            .body(ByteStream::from_static(b"x"))
            .send()
            .await
            .expect("put_object");

        // Poke the log bucket once so anything buffered is delivered.
        let _ = client.list_objects().bucket(LOG_BUCKET).send().await;
        let found = wait_for_log_line(&client, LOG_BUCKET, &format!("- {bucket} [")).await;
        assert!(found.is_none());

        crate::cleanup_bucket(&client, &bucket).await;
    }
}
