pub mod auto_checkout;
