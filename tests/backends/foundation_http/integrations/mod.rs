mod tcp_client_tests;
