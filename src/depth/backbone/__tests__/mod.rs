mod repair_test;
