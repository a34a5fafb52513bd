pub mod benefits;
