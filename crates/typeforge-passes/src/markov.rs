//! Character-trigram Markov scorer for property names.
//!
//! Map inference needs to tell hand-written property names ("firstName",
//! "created_at") apart from generated keys (hashes, ids, arbitrary user
//! input). The chain is trained at first use from an embedded corpus of
//! real-world property names, which keeps the model reproducible and
//! reviewable; scores are per-transition geometric means so name length
//! does not skew the comparison.

use std::collections::HashMap;

/// Transition context is the previous two bytes; names are scored over the
/// 128-symbol ASCII alphabet with non-ASCII folded onto the top symbol.
const ALPHABET: u32 = 128;
const DEPTH: usize = 3;

/// Laplace smoothing weight; unseen transitions in seen contexts score
/// low but never zero.
const SMOOTHING: f64 = 0.1;

/// Score assigned to names too short to contain a transition. High enough
/// to read as "plausibly hand-written"; short keys like `id` or `x` are
/// not evidence of a map.
const NEUTRAL_SCORE: f64 = 0.5;

/// Probability for a transition whose two-byte context the corpus never
/// produced: uniform over the alphabet.
const UNSEEN_CONTEXT_PROBABILITY: f64 = 1.0 / ALPHABET as f64;

const MIN_TRANSITION_PROBABILITY: f64 = 1e-6;

pub struct MarkovChain {
    transitions: HashMap<[u8; 2], (HashMap<u8, u32>, u32)>,
}

impl MarkovChain {
    pub fn depth(&self) -> usize {
        DEPTH
    }

    pub fn trained() -> MarkovChain {
        let mut chain = MarkovChain {
            transitions: HashMap::new(),
        };
        for word in CORPUS {
            chain.observe(word);
        }
        chain
    }

    fn observe(&mut self, word: &str) {
        let bytes = fold_ascii(word);
        for window in bytes.windows(DEPTH) {
            let (counts, total) = self
                .transitions
                .entry([window[0], window[1]])
                .or_insert_with(|| (HashMap::new(), 0));
            *counts.entry(window[2]).or_insert(0) += 1;
            *total += 1;
        }
    }

    /// Geometric mean of the transition probabilities across the name.
    pub fn score(&self, name: &str) -> f64 {
        let bytes = fold_ascii(name);
        if bytes.len() < DEPTH {
            return NEUTRAL_SCORE;
        }
        let mut log_sum = 0.0;
        let mut transitions = 0u32;
        for window in bytes.windows(DEPTH) {
            let p = match self.transitions.get(&[window[0], window[1]]) {
                None => UNSEEN_CONTEXT_PROBABILITY,
                Some((counts, total)) => {
                    let count = counts.get(&window[2]).copied().unwrap_or(0);
                    (f64::from(count) + SMOOTHING)
                        / (f64::from(*total) + SMOOTHING * f64::from(ALPHABET))
                }
            };
            log_sum += p.max(MIN_TRANSITION_PROBABILITY).ln();
            transitions += 1;
        }
        (log_sum / f64::from(transitions)).exp()
    }

    /// Geometric mean of `score` over all names; the "mapness" signal for
    /// a whole property-name set.
    pub fn score_all<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> f64 {
        let mut log_sum = 0.0;
        let mut count = 0u32;
        for name in names {
            log_sum += self.score(name).max(MIN_TRANSITION_PROBABILITY).ln();
            count += 1;
        }
        if count == 0 {
            return NEUTRAL_SCORE;
        }
        (log_sum / f64::from(count)).exp()
    }
}

fn fold_ascii(word: &str) -> Vec<u8> {
    word.bytes()
        .map(|b| if b < ALPHABET as u8 { b } else { ALPHABET as u8 - 1 })
        .collect()
}

/// Property names sampled from common REST, schema, and configuration
/// vocabularies.
const CORPUS: &[&str] = &[
    "accountId", "active", "additionalInfo", "address", "addressLine", "algorithm", "amount",
    "annotations", "apiVersion", "archived", "arguments", "attachment", "attributes", "author",
    "avatar", "avatarUrl", "balance", "basePath", "birthday", "body", "branch", "brand",
    "browserName", "bucket", "buildNumber", "cacheControl", "callback", "campaign", "canceled",
    "capacity", "caption", "category", "categoryId", "channel", "checksum", "children", "city",
    "className", "clientId", "code", "collection", "color", "columns", "comment", "comments",
    "company", "companyName", "completed", "conditions", "config", "configuration", "confirmed",
    "connection", "contact", "contactEmail", "content", "contentType", "context", "coordinates",
    "count", "country", "countryCode", "county", "createdAt", "createdBy", "created_at",
    "creationDate", "credentials", "currency", "currentPage", "customer", "customerId", "data",
    "dateOfBirth", "day", "defaultValue", "deletedAt", "department", "dependencies",
    "description", "details", "direction", "disabled", "discount", "displayName", "distance",
    "district", "document", "domain", "download", "downloadUrl", "draft", "duration", "email",
    "emailAddress", "employee", "enabled", "encoding", "endDate", "endTime", "endpoint",
    "entries", "environment", "error", "errorCode", "errorMessage", "errors", "event",
    "eventType", "exchange", "expiration", "expiresAt", "expiresIn", "extension", "external",
    "externalId", "favorite", "features", "fields", "fileName", "filePath", "fileSize",
    "filename", "filter", "filters", "fingerprint", "firstName", "first_name", "flags",
    "followers", "format", "fragment", "frequency", "friendly", "fullName", "gender", "genre",
    "group", "groupId", "groups", "hash", "headers", "height", "hidden", "highlights",
    "homepage", "hostname", "hour", "iconUrl", "identifier", "image", "imageUrl", "images",
    "index", "industry", "info", "ingredients", "initials", "inputs", "installments",
    "instructions", "internal", "interval", "invoiceId", "isActive", "isDefault", "isDeleted",
    "isEnabled", "isPublic", "isValid", "items", "keywords", "kind", "label", "labels",
    "language", "lastLogin", "lastModified", "lastName", "last_name", "lastUpdated", "latitude",
    "layout", "length", "level", "license", "limit", "link", "links", "locale", "location",
    "locked", "login", "logo", "logoUrl", "longitude", "manager", "manufacturer", "maxLength",
    "maximum", "members", "message", "messages", "metadata", "method", "mimeType", "minLength",
    "minimum", "minute", "mobile", "mode", "model", "modified", "month", "name", "namespace",
    "nationality", "nickname", "notes", "notifications", "number", "offset", "options", "order",
    "orderId", "ordering", "organization", "origin", "output", "owner", "ownerId", "packages",
    "pageCount", "pageSize", "parameters", "parent", "parentId", "password", "path", "pattern",
    "payload", "payment", "paymentMethod", "pending", "percentage", "period", "permissions",
    "phone", "phoneNumber", "phone_number", "photo", "photoUrl", "platform", "port", "position",
    "postalCode", "postal_code", "preferences", "prefix", "price", "priority", "privacy",
    "private", "product", "productId", "profile", "progress", "project", "projectId",
    "properties", "protected", "protocol", "provider", "public", "published", "publishedAt",
    "publisher", "quantity", "query", "question", "rating", "reason", "recipient", "records",
    "reference", "region", "registered", "releaseDate", "removed", "repository", "requestId",
    "required", "resolution", "resource", "response", "result", "results", "revision", "role",
    "roles", "route", "rows", "salary", "schedule", "schema", "scope", "score", "search",
    "season", "second", "secret", "section", "sections", "segment", "sender", "sequence",
    "serialNumber", "series", "serverName", "service", "sessionId", "settings", "severity",
    "shipping", "shortName", "signature", "size", "skills", "slug", "sortOrder", "source",
    "sourceUrl", "stage", "startDate", "startTime", "started", "state", "status", "statusCode",
    "steps", "street", "subject", "submittedAt", "subscription", "subtitle", "success",
    "suffix", "summary", "supplier", "surname", "symbol", "tagline", "tags", "target",
    "targetUrl", "taskId", "template", "tenantId", "text", "theme", "thumbnail", "thumbnailUrl",
    "timeZone", "timeout", "timestamp", "title", "token", "tokenType", "topic", "total",
    "totalCount", "totalPages", "totalPrice", "trackingNumber", "transaction", "transactionId",
    "translations", "type", "unit", "unitPrice", "units", "updatedAt", "updated_at", "upload",
    "uploadedAt", "userAgent", "userId", "user_id", "username", "users", "valid", "validFrom",
    "validUntil", "value", "values", "variant", "verified", "version", "visibility", "visible",
    "volume", "warnings", "website", "weight", "width", "year", "zipCode", "zip_code", "zone",
];
