// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use common::{Capabilities, Retryable, SourceCapability, UriError};
use portabletext::BlockOperation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::*;

/// Source error kind, mirroring the error taxonomy of the layer's
/// external contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SourceErrorKind {
	/// Malformed resource URI.
	InvalidUri,
	/// URI belongs to a different connection.
	UriNotForConnection,
	/// The resource does not exist.
	NotFound,
	/// Destination exists and overwrite was not requested.
	AlreadyExists,
	/// Delete on a non-empty directory without `recursive`.
	NotEmpty,
	/// Operation not declared by the provider.
	CapabilityUnsupported,
	/// Malformed search query.
	InvalidQuery,
	/// Missing credentials with no refresh path.
	AuthRequired,
	/// Stale credentials with no refresh path.
	AuthExpired,
	/// The backend returned an error.
	Upstream,
	/// Generic filesystem or network failure.
	Io,
	/// Caller cancellation.
	Cancelled,
}

/// Generic SourceError.
#[derive(Debug, Clone, Error)]
#[error("source error(kind={kind:?}, source={source})")]
#[allow(missing_docs)]
pub struct SourceError {
	pub kind: SourceErrorKind,
	#[source]
	pub source: Arc<anyhow::Error>,
}

/// Generic Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
	pub fn new(kind: SourceErrorKind, source: Arc<anyhow::Error>) -> Self {
		SourceError { kind, source }
	}

	/// Add some context to the wrapper error.
	pub fn add_context<C>(self, ctx: C) -> Self
	where
		C: fmt::Display + Send + Sync + 'static,
	{
		SourceError {
			kind: self.kind,
			source: Arc::new(anyhow::anyhow!("{ctx}").context(self.source)),
		}
	}

	/// Returns the corresponding `SourceErrorKind` for this error.
	pub fn kind(&self) -> SourceErrorKind {
		self.kind
	}

	pub fn unsupported(operation: &str) -> Self {
		SourceError::new(
			SourceErrorKind::CapabilityUnsupported,
			Arc::new(anyhow::anyhow!("operation `{operation}` is not supported by this data source")),
		)
	}

	pub fn not_found(what: impl fmt::Display) -> Self {
		SourceError::new(SourceErrorKind::NotFound, Arc::new(anyhow::anyhow!("{what} not found")))
	}

	pub fn cancelled() -> Self {
		SourceError::new(SourceErrorKind::Cancelled, Arc::new(anyhow::anyhow!("operation cancelled")))
	}
}

impl From<io::Error> for SourceError {
	fn from(err: io::Error) -> SourceError {
		match err.kind() {
			io::ErrorKind::NotFound =>
				SourceError::new(SourceErrorKind::NotFound, Arc::new(err.into())),
			io::ErrorKind::AlreadyExists =>
				SourceError::new(SourceErrorKind::AlreadyExists, Arc::new(err.into())),
			_ => SourceError::new(SourceErrorKind::Io, Arc::new(err.into())),
		}
	}
}

impl From<serde_json::Error> for SourceError {
	fn from(err: serde_json::Error) -> SourceError {
		SourceError::new(SourceErrorKind::Io, Arc::new(err.into()))
	}
}

impl From<UriError> for SourceError {
	fn from(err: UriError) -> SourceError {
		let kind = match err {
			UriError::Invalid(_) => SourceErrorKind::InvalidUri,
			UriError::NotForConnection { .. } => SourceErrorKind::UriNotForConnection,
		};
		SourceError::new(kind, Arc::new(err.into()))
	}
}

impl From<reqwest::Error> for SourceError {
	fn from(err: reqwest::Error) -> Self {
		let kind = match err.status() {
			Some(status) if status.as_u16() == 401 => SourceErrorKind::AuthRequired,
			Some(status) if status.as_u16() == 404 => SourceErrorKind::NotFound,
			Some(_) => SourceErrorKind::Upstream,
			None => SourceErrorKind::Io,
		};
		SourceError::new(kind, Arc::new(anyhow::anyhow!("backend request failed: {:?}", err)))
	}
}

impl Retryable for SourceError {
	fn is_retryable(&self) -> bool {
		matches!(self.kind, SourceErrorKind::Upstream | SourceErrorKind::Io)
	}
}

/// The common contract every per-connection accessor implements.
///
/// Methods outside the provider's advertised capability set keep their
/// default bodies, which refuse with `CapabilityUnsupported` instead of
/// silently doing nothing.
#[async_trait]
pub trait ResourceAccessor: fmt::Debug + Send + Sync {
	/// The advertised capability surface, copied from the provider.
	fn capabilities(&self) -> &Capabilities;

	/// `<accessMethod>+<providerType>+<connectionName>://` for the owning
	/// connection.
	fn uri_prefix(&self) -> &str;

	fn has_capability(&self, capability: SourceCapability) -> bool {
		self.capabilities().supports(capability)
	}

	/// Establishes a connection to the backing service.
	async fn check_connectivity(&self) -> anyhow::Result<()>;

	/// Never errors: a URI that fails to parse is simply not ours.
	fn is_resource_within_data_source(&self, uri: &str) -> bool;

	/// Never errors: any failure is reported as `false`.
	async fn resource_exists(&self, uri: &str, options: ExistsOptions) -> bool;

	async fn ensure_resource_path_exists(&self, _uri: &str) -> SourceResult<()> {
		Err(SourceError::unsupported("ensureResourcePathExists"))
	}

	async fn load_resource(&self, uri: &str, options: LoadOptions) -> SourceResult<LoadedResource>;

	async fn list_resources(&self, _options: ListOptions) -> SourceResult<ResourceListing> {
		Err(SourceError::unsupported("listResources"))
	}

	async fn search_resources(
		&self,
		_query: &str,
		_options: SearchOptions,
	) -> SourceResult<SearchReply> {
		Err(SourceError::unsupported("searchResources"))
	}

	async fn write_resource(
		&self,
		_uri: &str,
		_content: ResourceContent,
		_options: WriteOptions,
	) -> SourceResult<WriteReply> {
		Err(SourceError::unsupported("writeResource"))
	}

	async fn edit_resource(
		&self,
		_resource_path: &str,
		_operations: &[BlockOperation],
		_options: EditOptions,
	) -> SourceResult<EditReply> {
		Err(SourceError::unsupported("editResource"))
	}

	async fn move_resource(
		&self,
		_source_uri: &str,
		_destination_uri: &str,
		_options: MoveOptions,
	) -> SourceResult<MoveReply> {
		Err(SourceError::unsupported("moveResource"))
	}

	async fn delete_resource(
		&self,
		_uri: &str,
		_options: DeleteOptions,
	) -> SourceResult<DeleteReply> {
		Err(SourceError::unsupported("deleteResource"))
	}

	/// Best effort, never errors: whatever could not be collected is left
	/// unset.
	async fn get_metadata(&self) -> DataSourceMetadata;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_io_error_mapping() {
		let err: SourceError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
		assert_eq!(err.kind(), SourceErrorKind::NotFound);
		let err: SourceError = io::Error::new(io::ErrorKind::AlreadyExists, "there").into();
		assert_eq!(err.kind(), SourceErrorKind::AlreadyExists);
		let err: SourceError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
		assert_eq!(err.kind(), SourceErrorKind::Io);
	}

	#[test]
	fn test_uri_error_mapping() {
		let err: SourceError = UriError::Invalid("x".into()).into();
		assert_eq!(err.kind(), SourceErrorKind::InvalidUri);
		let err: SourceError = UriError::NotForConnection {
			uri: "bb+a+b://c".into(),
			expected_prefix: "bb+a+z://".into(),
		}
		.into();
		assert_eq!(err.kind(), SourceErrorKind::UriNotForConnection);
	}

	#[test]
	fn test_retryable_kinds() {
		assert!(SourceError::new(SourceErrorKind::Upstream, Arc::new(anyhow::anyhow!("x")))
			.is_retryable());
		assert!(SourceError::new(SourceErrorKind::Io, Arc::new(anyhow::anyhow!("x")))
			.is_retryable());
		assert!(!SourceError::unsupported("writeResource").is_retryable());
		assert!(!SourceError::cancelled().is_retryable());
	}
}
