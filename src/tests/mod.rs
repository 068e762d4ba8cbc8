mod correctness;
