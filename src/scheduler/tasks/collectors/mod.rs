pub mod karmada;
