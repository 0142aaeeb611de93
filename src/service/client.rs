//! Client coordinator.
//!
//! Every read and write folds the principal's client scope into the store
//! query, so an out-of-scope id behaves exactly like a missing record.
//! Document batches are accepted all-or-nothing: the upload gate runs first,
//! blob writes happen only after the aggregate is confirmed visible, and a
//! failed attach rolls the written blobs back.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::auth::Principal;
use crate::blob::BlobStore;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ValidationErrors};
use crate::model::Currency;
use crate::model::client::{
    Client, ClientPatch, ClientStatus, Document, DocumentCategory, MAX_DOCUMENT_DESCRIPTION_LEN,
    NewClient,
};
use crate::policy::{self, ClientScope};
use crate::store::{ClientFilter, ClientStats, Database, Page, SortOrder};
use crate::upload::{self, IncomingFile};

use super::{MAX_WRITE_RETRIES, RETRIES_EXHAUSTED, page_request, with_timeout};

/// Blob deletes during a cascade run with this much parallelism.
const CASCADE_DELETE_CONCURRENCY: usize = 4;

/// List-query parameters as they arrive from the caller, before clamping.
#[derive(Debug, Clone, Default)]
pub struct ClientListRequest {
    pub search: Option<String>,
    pub status: Option<ClientStatus>,
    pub currency: Option<Currency>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

pub struct ClientService {
    db: Arc<dyn Database>,
    blobs: Arc<dyn BlobStore>,
    config: ServiceConfig,
}

impl ClientService {
    pub fn new(db: Arc<dyn Database>, blobs: Arc<dyn BlobStore>, config: ServiceConfig) -> Self {
        Self { db, blobs, config }
    }

    /// The principal's client scope, or `AccessDenied` for roles with no
    /// client access at all.
    fn scope(&self, principal: &Principal) -> Result<ClientScope, ServiceError> {
        policy::client_scope(principal)
            .ok_or(ServiceError::AccessDenied("role has no access to clients"))
    }

    pub async fn create(
        &self,
        principal: &Principal,
        input: NewClient,
    ) -> Result<Client, ServiceError> {
        if !policy::can_create_client(principal) {
            return Err(ServiceError::AccessDenied(
                "role may not create clients",
            ));
        }
        let client = Client::create(input, principal.id)?;
        let stored = with_timeout(self.config.io_timeout, self.db.insert_client(client)).await?;
        tracing::info!(client = %stored.id, code = %stored.code, "client created");
        Ok(stored)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        request: ClientListRequest,
    ) -> Result<Page<Client>, ServiceError> {
        let scope = self.scope(principal)?;
        let filter = ClientFilter {
            scope,
            search: request.search,
            status: request.status,
            currency: request.currency,
        };
        let page = page_request(
            &self.config,
            request.page,
            request.per_page,
            request.sort_by,
            request.sort_order,
        );
        with_timeout(self.config.io_timeout, self.db.find_clients(&filter, &page)).await
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<Client, ServiceError> {
        let scope = self.scope(principal)?;
        with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("client"))
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: ClientPatch,
    ) -> Result<Client, ServiceError> {
        let scope = self.scope(principal)?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
                .await?
                .ok_or(ServiceError::NotFound("client"))?;
            client.apply(patch.clone())?;
            if let Some(stored) =
                with_timeout(self.config.io_timeout, self.db.replace_client(client, &scope))
                    .await?
            {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    /// Delete a client and cascade its document blobs. Blob cleanup is
    /// best-effort: a missing or failing blob is logged and never blocks the
    /// record deletion.
    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), ServiceError> {
        let scope = self.scope(principal)?;
        let removed = with_timeout(self.config.io_timeout, self.db.delete_client(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("client"))?;

        let timeout = self.config.io_timeout;
        stream::iter(removed.documents)
            .map(|doc| {
                let blobs = Arc::clone(&self.blobs);
                async move {
                    if let Err(err) = with_timeout(timeout, blobs.delete(&doc.path)).await {
                        tracing::warn!(
                            client = %id,
                            document = %doc.id,
                            path = %doc.path,
                            "cascade blob delete failed: {err}"
                        );
                    }
                }
            })
            .buffer_unordered(CASCADE_DELETE_CONCURRENCY)
            .collect::<()>()
            .await;

        tracing::info!(client = %id, "client deleted");
        Ok(())
    }

    /// Attach an uploaded batch of documents. All-or-nothing: the gate runs
    /// before any blob is written, and blobs written for a batch that fails
    /// to attach are deleted before returning.
    pub async fn add_documents(
        &self,
        principal: &Principal,
        id: Uuid,
        files: Vec<IncomingFile>,
        category: Option<DocumentCategory>,
        description: Option<String>,
    ) -> Result<Client, ServiceError> {
        let scope = self.scope(principal)?;
        if let Some(description) = &description
            && description.chars().count() > MAX_DOCUMENT_DESCRIPTION_LEN
        {
            let mut errors = ValidationErrors::new();
            errors.push(
                "description",
                format!("cannot be more than {MAX_DOCUMENT_DESCRIPTION_LEN} characters"),
            );
            return Err(errors.into());
        }
        upload::validate_batch(&files, &self.config.upload)?;

        // Confirm visibility before accepting any bytes.
        with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("client"))?;

        let category = category.unwrap_or_default();
        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let path = match with_timeout(
                self.config.io_timeout,
                self.blobs.put(file.bytes.clone(), &file.content_type),
            )
            .await
            {
                Ok(path) => path,
                Err(err) => {
                    self.rollback_blobs(&documents).await;
                    return Err(err);
                }
            };
            documents.push(Document {
                id: Uuid::new_v4(),
                filename: path.clone(),
                original_name: file.original_name,
                mimetype: file.content_type,
                size: file.bytes.len() as u64,
                path,
                uploaded_by: principal.id,
                uploaded_at: Utc::now(),
                category,
                description: description.clone(),
            });
        }

        for _ in 0..MAX_WRITE_RETRIES {
            let client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
                .await?;
            let Some(mut client) = client else {
                self.rollback_blobs(&documents).await;
                return Err(ServiceError::NotFound("client"));
            };
            for document in &documents {
                client.add_document(document.clone());
            }
            if let Some(stored) =
                with_timeout(self.config.io_timeout, self.db.replace_client(client, &scope))
                    .await?
            {
                return Ok(stored);
            }
        }
        self.rollback_blobs(&documents).await;
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    async fn rollback_blobs(&self, documents: &[Document]) {
        for document in documents {
            if let Err(err) =
                with_timeout(self.config.io_timeout, self.blobs.delete(&document.path)).await
            {
                tracing::warn!(path = %document.path, "upload rollback delete failed: {err}");
            }
        }
    }

    /// Detach a document. The blob goes first, so a failure between the two
    /// steps leaves a retryable record rather than an orphaned blob; an
    /// already-missing blob is fine.
    pub async fn remove_document(
        &self,
        principal: &Principal,
        id: Uuid,
        document_id: Uuid,
    ) -> Result<Client, ServiceError> {
        let scope = self.scope(principal)?;
        let client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("client"))?;
        let document = client
            .document(document_id)
            .ok_or(ServiceError::NotFound("document"))?
            .clone();

        let existed = with_timeout(self.config.io_timeout, self.blobs.delete(&document.path))
            .await?;
        if !existed {
            tracing::warn!(path = %document.path, "blob already absent during document removal");
        }

        for _ in 0..MAX_WRITE_RETRIES {
            let mut client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
                .await?
                .ok_or(ServiceError::NotFound("client"))?;
            if client.remove_document(document_id).is_none() {
                // A concurrent writer already detached it; the blob is gone
                // either way.
                return Ok(client);
            }
            if let Some(stored) =
                with_timeout(self.config.io_timeout, self.db.replace_client(client, &scope))
                    .await?
            {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    /// Scoped read of a document's metadata and bytes.
    pub async fn read_document(
        &self,
        principal: &Principal,
        id: Uuid,
        document_id: Uuid,
    ) -> Result<(Document, Bytes), ServiceError> {
        let scope = self.scope(principal)?;
        let client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("client"))?;
        let document = client
            .document(document_id)
            .ok_or(ServiceError::NotFound("document"))?
            .clone();
        let bytes =
            with_timeout(self.config.io_timeout, self.blobs.read(&document.path)).await?;
        Ok((document, bytes))
    }

    pub async fn add_note(
        &self,
        principal: &Principal,
        id: Uuid,
        content: &str,
    ) -> Result<Client, ServiceError> {
        let scope = self.scope(principal)?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut client = with_timeout(self.config.io_timeout, self.db.find_client(id, &scope))
                .await?
                .ok_or(ServiceError::NotFound("client"))?;
            client.add_note(content, principal.id)?;
            if let Some(stored) =
                with_timeout(self.config.io_timeout, self.db.replace_client(client, &scope))
                    .await?
            {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn stats(&self, principal: &Principal) -> Result<ClientStats, ServiceError> {
        let scope = self.scope(principal)?;
        with_timeout(self.config.io_timeout, self.db.client_stats(&scope)).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::Role;
    use crate::blob::MemoryBlobStore;
    use crate::store::memory::MemoryBackend;

    fn service() -> (ClientService, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = ClientService::new(
            Arc::new(MemoryBackend::new()),
            blobs.clone(),
            ServiceConfig::default(),
        );
        (service, blobs)
    }

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role,
        }
    }

    fn new_client(name: &str, code: &str) -> NewClient {
        NewClient {
            name: name.to_string(),
            code: code.to_string(),
            currency: Some(Currency::Usd),
            description: None,
            contact_info: None,
            primary_contact: None,
            business_info: None,
            billing: None,
            status: None,
            engagement_manager: None,
            tags: Vec::new(),
        }
    }

    fn pdf(name: &str) -> IncomingFile {
        IncomingFile {
            original_name: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: Bytes::from_static(b"%PDF-1.4 test"),
        }
    }

    #[tokio::test]
    async fn resource_manager_cannot_create_or_list_clients() {
        let (service, _) = service();
        let rm = principal(Role::ResourceManager);

        let err = service
            .create(&rm, new_client("Acme", "ACME01"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "access_denied");

        let err = service
            .list(&rm, ClientListRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "access_denied");
    }

    #[tokio::test]
    async fn owner_default_is_the_creator() {
        let (service, _) = service();
        let manager = principal(Role::EngagementManager);
        let client = service
            .create(&manager, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        assert_eq!(client.engagement_manager, manager.id);
        assert_eq!(client.code, "ACME01");
    }

    #[tokio::test]
    async fn scoped_read_returns_not_found_for_other_managers() {
        let (service, _) = service();
        let owner = principal(Role::EngagementManager);
        let other = principal(Role::EngagementManager);
        let admin = principal(Role::Admin);

        let client = service
            .create(&owner, new_client("Acme", "ACME01"))
            .await
            .unwrap();

        let err = service.get(&other, client.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(service.get(&admin, client.id).await.is_ok());

        let page = service
            .list(&other, ClientListRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected_case_insensitively() {
        let (service, _) = service();
        let admin = principal(Role::Admin);
        service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();

        let err = service
            .create(&admin, new_client("Other", "acme01"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate_key");
    }

    #[tokio::test]
    async fn upload_batch_attaches_documents_and_blobs() {
        let (service, blobs) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();

        let stored = service
            .add_documents(
                &admin,
                client.id,
                vec![pdf("contract.pdf"), pdf("sow.pdf")],
                Some(DocumentCategory::Contract),
                None,
            )
            .await
            .unwrap();
        assert_eq!(stored.document_count(), 2);
        assert_eq!(blobs.len().await, 2);
    }

    #[tokio::test]
    async fn rejected_batch_leaves_no_blobs() {
        let (service, blobs) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();

        let bad = IncomingFile {
            original_name: "virus.exe".to_string(),
            content_type: "application/x-msdownload".to_string(),
            bytes: Bytes::from_static(b"MZ"),
        };
        let err = service
            .add_documents(&admin, client.id, vec![pdf("ok.pdf"), bad], None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn cascade_delete_removes_every_blob() {
        let (service, blobs) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        service
            .add_documents(
                &admin,
                client.id,
                vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(blobs.len().await, 3);

        service.delete(&admin, client.id).await.unwrap();
        assert!(blobs.is_empty().await);

        let err = service.get(&admin, client.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    /// Accepts writes but never finishes a delete.
    struct StalledBlobStore;

    #[async_trait::async_trait]
    impl crate::blob::BlobStore for StalledBlobStore {
        async fn put(
            &self,
            _bytes: Bytes,
            _content_type: &str,
        ) -> Result<String, crate::error::BlobError> {
            Ok(format!("{}.pdf", Uuid::new_v4()))
        }

        async fn delete(&self, _path: &str) -> Result<bool, crate::error::BlobError> {
            std::future::pending().await
        }

        async fn read(&self, _path: &str) -> Result<Bytes, crate::error::BlobError> {
            Err(crate::error::BlobError::NotFound)
        }
    }

    #[tokio::test]
    async fn cascade_delete_is_bounded_by_the_io_timeout() {
        let config = ServiceConfig {
            io_timeout: std::time::Duration::from_millis(50),
            ..ServiceConfig::default()
        };
        let service = ClientService::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(StalledBlobStore),
            config,
        );
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        service
            .add_documents(&admin, client.id, vec![pdf("a.pdf")], None, None)
            .await
            .unwrap();

        // The record delete must complete even though blob cleanup hangs.
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            service.delete(&admin, client.id),
        )
        .await
        .expect("delete returns within the timeout bound");
        assert!(result.is_ok());
        assert_eq!(
            service.get(&admin, client.id).await.unwrap_err().kind(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn remove_document_deletes_blob_first_and_tolerates_absence() {
        let (service, blobs) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        let stored = service
            .add_documents(&admin, client.id, vec![pdf("a.pdf")], None, None)
            .await
            .unwrap();
        let document = stored.documents[0].clone();

        // Simulate an earlier half-completed removal.
        blobs.delete(&document.path).await.unwrap();

        let after = service
            .remove_document(&admin, client.id, document.id)
            .await
            .unwrap();
        assert_eq!(after.document_count(), 0);
    }

    #[tokio::test]
    async fn read_document_round_trips_bytes() {
        let (service, _) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        let stored = service
            .add_documents(&admin, client.id, vec![pdf("a.pdf")], None, None)
            .await
            .unwrap();

        let (meta, bytes) = service
            .read_document(&admin, client.id, stored.documents[0].id)
            .await
            .unwrap();
        assert_eq!(meta.original_name, "a.pdf");
        assert_eq!(bytes, Bytes::from_static(b"%PDF-1.4 test"));
    }

    #[tokio::test]
    async fn notes_append_and_validate() {
        let (service, _) = service();
        let admin = principal(Role::Admin);
        let client = service
            .create(&admin, new_client("Acme", "ACME01"))
            .await
            .unwrap();

        let stored = service
            .add_note(&admin, client.id, "kickoff scheduled")
            .await
            .unwrap();
        assert_eq!(stored.notes.len(), 1);

        let err = service.add_note(&admin, client.id, "   ").await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn stats_are_scope_filtered() {
        let (service, _) = service();
        let owner = principal(Role::EngagementManager);
        let other = principal(Role::EngagementManager);
        service
            .create(&owner, new_client("Acme", "ACME01"))
            .await
            .unwrap();
        service
            .create(&other, new_client("Beta", "BETA01"))
            .await
            .unwrap();

        let mine = service.stats(&owner).await.unwrap();
        assert_eq!(mine.total_clients, 1);

        let all = service.stats(&principal(Role::Admin)).await.unwrap();
        assert_eq!(all.total_clients, 2);
    }
}
