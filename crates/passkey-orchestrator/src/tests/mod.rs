mod fixtures;

mod orchestrator_tests;
