pub mod annotation;
pub mod fasta;
pub mod record_stream;
pub mod stats_file;
