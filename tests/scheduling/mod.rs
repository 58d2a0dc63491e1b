mod link_dispatch_test;
