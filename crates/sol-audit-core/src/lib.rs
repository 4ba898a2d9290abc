pub mod audit;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod single;
pub mod source;
pub mod store;

pub use audit::{
    AuditResult, AuditSnapshot, AuditValidationError, Explanation, FileOutcome, Severity,
    SuggestedFix, Vulnerability,
};
pub use llm::{
    build_gateway, AuditGateway, GatewayAuditor, SourceAuditor, Vendor, VendorProfile,
    VendorProfiles, VendorSettings,
};
pub use parser::{parse_audit_response, UnparsableResponse};
pub use pipeline::{PipelineConfig, PipelineError, RepositoryAuditPipeline};
pub use single::{audit_single, SingleAudit};
pub use source::{
    ContentFetcher, GithubClient, GithubSettings, ListingError, RepositoryReference, SourceFile,
    SourceFileWithContent, SourceLister,
};
pub use store::{AuditRecord, AuditStore, FileAuditStore, InMemoryAuditStore, StoreError};
