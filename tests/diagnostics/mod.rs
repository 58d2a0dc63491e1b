mod diagnostics_endpoint_test;
