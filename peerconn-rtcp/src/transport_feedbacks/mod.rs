pub mod transport_layer_cc;
pub mod transport_layer_nack;
