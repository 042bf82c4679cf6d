//! S3 XML response documents.
//!
//! All documents carry the XML declaration; success documents use the S3
//! namespace, errors use a flat `<Error>` root without one, as the real
//! service does. Timestamps are ISO 8601 with millisecond precision.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use ruststack_s3_core::{BucketInfo, ListObjectsResult, ObjectInfo};

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Owner reported for every bucket and object.
const OWNER_ID: &str = "123456789000";
const OWNER_NAME: &str = "ruststack";

/// Format a timestamp the way S3 does in XML bodies.
#[must_use]
pub fn xml_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// `ListAllMyBucketsResult` for ListBuckets.
#[must_use]
pub fn list_buckets_xml(buckets: &[BucketInfo]) -> Vec<u8> {
    render("ListAllMyBucketsResult", Some(S3_NAMESPACE), |w| {
        write_owner(w)?;
        w.create_element("Buckets").write_inner_content(|w| {
            for bucket in buckets {
                w.create_element("Bucket").write_inner_content(|w| {
                    write_text_element(w, "Name", &bucket.name)?;
                    write_text_element(w, "CreationDate", &xml_timestamp(&bucket.creation_date))
                })?;
            }
            Ok(())
        })?;
        Ok(())
    })
}

/// `ListBucketResult` for ListObjects (v1).
#[must_use]
pub fn list_objects_xml(
    bucket: &str,
    prefix: &str,
    max_keys: usize,
    result: &ListObjectsResult,
) -> Vec<u8> {
    render("ListBucketResult", Some(S3_NAMESPACE), |w| {
        write_text_element(w, "Name", bucket)?;
        write_text_element(w, "Prefix", prefix)?;
        write_text_element(w, "Marker", "")?;
        write_text_element(w, "MaxKeys", &max_keys.to_string())?;
        write_text_element(w, "IsTruncated", bool_str(result.is_truncated))?;
        for object in &result.objects {
            w.create_element("Contents").write_inner_content(|w| {
                write_text_element(w, "Key", &object.key)?;
                write_text_element(w, "LastModified", &xml_timestamp(&object.last_modified))?;
                write_text_element(w, "ETag", &object.etag)?;
                write_text_element(w, "Size", &object.size.to_string())?;
                write_text_element(w, "StorageClass", "STANDARD")?;
                write_owner(w)
            })?;
        }
        Ok(())
    })
}

/// `CopyObjectResult` for CopyObject.
#[must_use]
pub fn copy_object_xml(object: &ObjectInfo) -> Vec<u8> {
    render("CopyObjectResult", Some(S3_NAMESPACE), |w| {
        write_text_element(w, "LastModified", &xml_timestamp(&object.last_modified))?;
        write_text_element(w, "ETag", &object.etag)
    })
}

/// Format an S3 error as a flat `<Error>` document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchBucket</Code>
///   <Message>The specified bucket does not exist</Message>
///   <Resource>mybucket</Resource>
///   <RequestId>4442587FB7D0A2F9</RequestId>
/// </Error>
/// ```
#[must_use]
pub fn error_to_xml(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Vec<u8> {
    render("Error", None, |w| {
        write_text_element(w, "Code", code)?;
        write_text_element(w, "Message", message)?;
        if let Some(resource) = resource {
            write_text_element(w, "Resource", resource)?;
        }
        write_text_element(w, "RequestId", request_id)
    })
}

/// Write a complete document into a buffer.
///
/// Writing into a `Vec<u8>` cannot fail for I/O reasons; a failure here is a
/// logic error and yields an empty body.
fn render<F>(root: &str, namespace: Option<&str>, content: F) -> Vec<u8>
where
    F: FnOnce(&mut Writer<&mut Vec<u8>>) -> io::Result<()>,
{
    let mut buf = Vec::with_capacity(512);
    if let Err(e) = write_document(&mut buf, root, namespace, content) {
        tracing::error!(error = %e, root, "failed to serialize S3 XML");
        buf.clear();
    }
    buf
}

fn write_document<F>(
    buf: &mut Vec<u8>,
    root: &str,
    namespace: Option<&str>,
    content: F,
) -> io::Result<()>
where
    F: FnOnce(&mut Writer<&mut Vec<u8>>) -> io::Result<()>,
{
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let element = writer.create_element(root);
    let element = match namespace {
        Some(ns) => element.with_attribute(("xmlns", ns)),
        None => element,
    };
    element.write_inner_content(content)?;
    Ok(())
}

fn write_owner<W: Write>(writer: &mut Writer<W>) -> io::Result<()> {
    writer.create_element("Owner").write_inner_content(|w| {
        write_text_element(w, "ID", OWNER_ID)?;
        write_text_element(w, "DisplayName", OWNER_NAME)
    })?;
    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
