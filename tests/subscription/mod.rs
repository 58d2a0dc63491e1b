mod subscription_flow_test;
