mod client;
mod query;

pub use client::{
    ApiErrorClass, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileLabels, FileList,
    ParentReference,
};
pub use query::{SearchQuery, WILDCARD};
