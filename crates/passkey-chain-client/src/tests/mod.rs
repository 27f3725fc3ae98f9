mod views_tests;
