mod transport_1d;
