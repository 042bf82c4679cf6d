//! Bucket integration tests.

#[cfg(test)]
mod tests {
    use crate::{cleanup_bucket, create_test_bucket, s3_client, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_create_list_and_delete_bucket() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "crud").await;

        let resp = client.list_buckets().send().await.expect("list_buckets");
        assert!(
            resp.buckets()
                .iter()
                .any(|b| b.name() == Some(bucket.as_str()))
        );

        client
            .head_bucket()
            .bucket(&bucket)
            .send()
            .await
            .expect("head_bucket");

        cleanup_bucket(&client, &bucket).await;
        assert!(client.head_bucket().bucket(&bucket).send().await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_on_missing_bucket() {
        let client = s3_client();
        let err = client
            .list_objects()
            .bucket(test_bucket_name("missing"))
            .send()
            .await
            .expect_err("listing a missing bucket should fail");
        assert!(err.into_service_error().is_no_such_bucket());
    }
}
