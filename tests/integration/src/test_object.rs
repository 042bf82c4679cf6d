//! Object CRUD integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;

    use crate::{cleanup_bucket, create_test_bucket, s3_client};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_and_get_object() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "putget").await;

        let body = b"hello, ruststack!";
        client
            .put_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .body(ByteStream::from_static(body))
            .content_type("text/plain")
            .metadata("owner", "alice")
            .send()
            .await
            .expect("put_object");

        let resp = client
            .get_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .send()
            .await
            .expect("get_object");

        assert_eq!(resp.content_type(), Some("text/plain"));
        assert_eq!(resp.content_length(), Some(17));
        assert_eq!(
            resp.metadata().and_then(|m| m.get("owner")).map(String::as_str),
            Some("alice")
        );

        let data = resp
            .body
            .collect()
            .await
            .expect("collect body")
            .into_bytes();
        assert_eq!(data.as_ref(), body);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_objects_by_prefix() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "list").await;

        for key in ["a/1.txt", "a/2.txt", "b/1.txt"] {
            client
                .put_object()
                .bucket(&bucket)
                .key(key)
                .body(ByteStream::from_static(b"x"))
                .send()
                .await
                .expect("put_object");
        }

        let resp = client
            .list_objects()
            .bucket(&bucket)
            .prefix("a/")
            .send()
            .await
            .expect("list_objects");
        let keys: Vec<&str> = resp.contents().iter().filter_map(|o| o.key()).collect();
        assert_eq!(keys, vec!["a/1.txt", "a/2.txt"]);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_delete_object() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "delete").await;

        client
            .put_object()
            .bucket(&bucket)
            .key("gone.txt")
            .body(ByteStream::from_static(b"bye"))
            .send()
            .await
            .expect("put_object");
        client
            .delete_object()
            .bucket(&bucket)
            .key("gone.txt")
            .send()
            .await
            .expect("delete_object");

        let err = client
            .get_object()
            .bucket(&bucket)
            .key("gone.txt")
            .send()
            .await
            .expect_err("object should be gone");
        assert!(err.into_service_error().is_no_such_key());

        cleanup_bucket(&client, &bucket).await;
    }
}
