//! Putting the exported matrices where the training job reads them.

use std::fs;
use std::path::Path;

use chrono::Utc;
use recfm_core::dataset::content_digest;
use recfm_core::errors::DataError;
use recfm_core::state::{DatasetState, UploadedInputs};

use crate::client::ObjectStore;
use crate::errors::WorkflowError;
use crate::training::LIBSVM_CONTENT_TYPE;

/// Object URI for a local export under a channel prefix.
pub fn object_uri(prefix: &str, path: &Path) -> String {
    let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("data.libsvm");
    format!("{}/{file_name}", prefix.trim_end_matches('/'))
}

/// Upload the train and test exports written by `prepare` under their
/// channel prefixes.
pub async fn upload_training_inputs<S>(
    store: &S,
    dataset: &DatasetState,
) -> Result<UploadedInputs, WorkflowError>
where
    S: ObjectStore + ?Sized,
{
    let (train_object_uri, train_digest) =
        upload_file(store, &dataset.train_uri, &dataset.train_path).await?;
    let (test_object_uri, test_digest) =
        upload_file(store, &dataset.test_uri, &dataset.test_path).await?;

    Ok(UploadedInputs {
        train_object_uri,
        test_object_uri,
        train_digest,
        test_digest,
        uploaded_at: Utc::now(),
    })
}

async fn upload_file<S>(
    store: &S,
    prefix: &str,
    path: &Path,
) -> Result<(String, String), WorkflowError>
where
    S: ObjectStore + ?Sized,
{
    let body =
        fs::read(path).map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
    let digest = content_digest(&body);
    let uri = object_uri(prefix, path);
    let bytes = body.len();

    store.put_object(&uri, LIBSVM_CONTENT_TYPE, body).await?;
    tracing::info!(
        event_name = "data.upload.completed",
        uri = %uri,
        bytes,
        digest = %digest,
        "training input uploaded"
    );
    Ok((uri, digest))
}
