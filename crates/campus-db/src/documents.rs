//! Binary documents with SHA-256 digests and Ed25519 signatures.
//!
//! The payload is stored as a BLOB next to the hex digest of its bytes.
//! Signing covers the raw 32-byte digest, and the signature and the
//! signer's public key are stored hex-encoded on the row.
//!
//! The key stored on the row only records who signed. Verification is
//! always against a key the caller trusts, never against the row itself.

use campus_types::{Document, DocumentSummary, NewDocument};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::tables;
use crate::error::DbError;
use crate::mutation::{apply_mutation, Mutation, MutationKind, MutationObserver};
use crate::value::Value;

/// Outcome of [`verify_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Digest matches the payload and the signature checks out.
    Valid,
    /// Digest matches but nobody has signed the document.
    Unsigned,
    /// The payload no longer hashes to the stored digest.
    DigestMismatch,
    /// The row was signed by a key other than the trusted one.
    UntrustedKey,
    /// The stored signature or key is malformed or does not verify.
    BadSignature,
}

impl Verification {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

fn digest(content: &[u8]) -> [u8; 32] {
    Sha256::digest(content).into()
}

/// Returns the lowercase hex SHA-256 of `content`.
pub fn digest_hex(content: &[u8]) -> String {
    hex::encode(digest(content))
}

/// Stores a document through the audited mutation path and returns its id.
///
/// # Errors
///
/// See [`apply_mutation`]; the actor needs `INSERT` on `documents`.
pub fn store_document(
    conn: &Connection,
    actor: &str,
    document: &NewDocument,
    observer: &dyn MutationObserver,
) -> Result<i64, DbError> {
    let mutation = Mutation::new(
        tables::DOCUMENTS,
        MutationKind::Insert,
        "INSERT INTO documents (title, mime_type, content, sha256_hex) VALUES (?1, ?2, ?3, ?4)",
    )
    .params(vec![
        Value::from(document.title.as_str()),
        Value::from(document.mime_type.as_str()),
        Value::from(document.content.clone()),
        Value::from(digest_hex(&document.content)),
    ]);

    let outcome = apply_mutation(conn, actor, &mutation, observer)?;
    let id = outcome
        .inserted_rowid
        .ok_or(DbError::Database(rusqlite::Error::QueryReturnedNoRows))?;

    tracing::info!(document_id = id, bytes = document.content.len(), "document stored");
    Ok(id)
}

/// Inserts a document row without an access check or audit entry.
pub(crate) fn insert_document_row(conn: &Connection, document: &NewDocument) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO documents (title, mime_type, content, sha256_hex) VALUES (?1, ?2, ?3, ?4)",
        params![
            document.title,
            document.mime_type,
            document.content,
            digest_hex(&document.content)
        ],
    )
    .map_err(|e| DbError::classify(tables::DOCUMENTS, e))?;
    Ok(conn.last_insert_rowid())
}

/// Fetches a document including its payload.
///
/// # Errors
///
/// Returns `DbError::NotFound` if no document has this id.
pub fn fetch_document(conn: &Connection, document_id: i64) -> Result<Document, DbError> {
    conn.query_row(
        "SELECT document_id, title, mime_type, content, sha256_hex,
                signature_hex, public_key_hex, created_at
         FROM documents WHERE document_id = ?1",
        [document_id],
        |row| {
            Ok(Document {
                document_id: row.get(0)?,
                title: row.get(1)?,
                mime_type: row.get(2)?,
                content: row.get(3)?,
                sha256_hex: row.get(4)?,
                signature_hex: row.get(5)?,
                public_key_hex: row.get(6)?,
                created_at: row.get(7)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound {
        entity: "document",
        key: document_id.to_string(),
    })
}

/// Lists document metadata ordered by id. Payloads are not read.
///
/// # Errors
///
/// Returns `DbError::Database` on SQL failure.
pub fn list_documents(conn: &Connection) -> Result<Vec<DocumentSummary>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT document_id, title, mime_type, length(content), sha256_hex,
                signature_hex IS NOT NULL, created_at
         FROM documents ORDER BY document_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(DocumentSummary {
            document_id: row.get(0)?,
            title: row.get(1)?,
            mime_type: row.get(2)?,
            size_bytes: row.get(3)?,
            sha256_hex: row.get(4)?,
            signed: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?);
    }
    Ok(documents)
}

/// Signs the stored digest of a document with `key`.
///
/// The payload must still hash to the digest recorded when it was stored;
/// a document whose bytes changed underneath is refused rather than
/// re-signed.
///
/// # Errors
///
/// Returns `DbError::NotFound` for an unknown id and
/// `DbError::DigestMismatch` if the payload no longer matches its digest.
/// Otherwise see [`apply_mutation`]; the actor needs `UPDATE` on `documents`.
pub fn sign_document(
    conn: &Connection,
    actor: &str,
    document_id: i64,
    key: &SigningKey,
    observer: &dyn MutationObserver,
) -> Result<Document, DbError> {
    let document = fetch_document(conn, document_id)?;
    let digest = digest(&document.content);
    if hex::encode(digest) != document.sha256_hex {
        tracing::warn!(document_id, actor, "refusing to sign a document with a stale digest");
        return Err(DbError::DigestMismatch { document_id });
    }
    let signature = key.sign(&digest);

    let mutation = Mutation::new(
        tables::DOCUMENTS,
        MutationKind::Update,
        "UPDATE documents SET signature_hex = ?1, public_key_hex = ?2
         WHERE document_id = ?3 AND sha256_hex = ?4",
    )
    .params(vec![
        Value::from(hex::encode(signature.to_bytes())),
        Value::from(hex::encode(key.verifying_key().to_bytes())),
        Value::from(document_id),
        Value::from(document.sha256_hex.as_str()),
    ])
    .row_key(document_id.to_string())
    .require_rows();

    apply_mutation(conn, actor, &mutation, observer)?;
    tracing::info!(document_id, actor, "document signed");

    fetch_document(conn, document_id)
}

/// Checks the stored digest against the payload, then the signature
/// against the digest using the `trusted` key.
///
/// # Errors
///
/// Returns `DbError::NotFound` if no document has this id.
pub fn verify_document(
    conn: &Connection,
    document_id: i64,
    trusted: &VerifyingKey,
) -> Result<Verification, DbError> {
    let document = fetch_document(conn, document_id)?;
    Ok(verify(&document, trusted))
}

/// Verifies an already fetched document; see [`verify_document`].
pub fn verify(document: &Document, trusted: &VerifyingKey) -> Verification {
    let digest = digest(&document.content);
    if hex::encode(digest) != document.sha256_hex {
        return Verification::DigestMismatch;
    }

    let (Some(signature_hex), Some(public_key_hex)) =
        (&document.signature_hex, &document.public_key_hex)
    else {
        return Verification::Unsigned;
    };

    let Some(signer) = hex::decode(public_key_hex)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
    else {
        return Verification::BadSignature;
    };
    if signer != trusted.to_bytes() {
        tracing::debug!(document_id = document.document_id, "signed by an untrusted key");
        return Verification::UntrustedKey;
    }

    let Some(signature) = hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| <[u8; 64]>::try_from(bytes.as_slice()).ok())
        .map(|bytes| Signature::from_bytes(&bytes))
    else {
        return Verification::BadSignature;
    };

    match trusted.verify(&digest, &signature) {
        Ok(()) => Verification::Valid,
        Err(e) => {
            tracing::debug!(document_id = document.document_id, "signature rejected: {}", e);
            Verification::BadSignature
        }
    }
}
