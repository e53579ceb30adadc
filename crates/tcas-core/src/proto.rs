//! Wire messages shared with remote execution clients.
//!
//! Field numbers follow the remote execution protocol revision that carries
//! BLAKE3ZCC hashes, so encoded messages interoperate with existing clients.

/// A digest as it appears on the wire. Exactly one hash field is expected
/// to be populated; which one determines the hashing algorithm.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Digest {
    #[prost(int64, tag = "2")]
    pub size_bytes: i64,
    #[prost(oneof = "digest::Hash", tags = "1, 3, 4")]
    pub hash: ::core::option::Option<digest::Hash>,
}

pub mod digest {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Hash {
        /// Lowercase hexadecimal MD5, SHA-1 or SHA-2 hash.
        #[prost(string, tag = "1")]
        Other(::prost::alloc::string::String),
        #[prost(bytes = "vec", tag = "3")]
        Blake3zcc(::prost::alloc::vec::Vec<u8>),
        #[prost(bytes = "vec", tag = "4")]
        Blake3zccManifest(::prost::alloc::vec::Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputFile {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub digest: ::core::option::Option<Digest>,
    #[prost(bool, tag = "4")]
    pub is_executable: bool,
}

/// Result of an executed action, stored in the action cache.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActionResult {
    #[prost(message, repeated, tag = "2")]
    pub output_files: ::prost::alloc::vec::Vec<OutputFile>,
    #[prost(int32, tag = "4")]
    pub exit_code: i32,
    #[prost(bytes = "vec", tag = "5")]
    pub stdout_raw: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub stdout_digest: ::core::option::Option<Digest>,
    #[prost(bytes = "vec", tag = "7")]
    pub stderr_raw: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "8")]
    pub stderr_digest: ::core::option::Option<Digest>,
}
