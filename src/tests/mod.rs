mod test_wait;
