pub mod spf;
